//! YAML configuration loading for the baby care tracker
//!
//! `configuration.yaml` supports these tags:
//!
//! - `!include path` - Include another YAML file
//! - `!include_dir_merge_list dir` - Merge lists from all YAML files in a directory
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use bct_config::AppConfig;
//!
//! let config = AppConfig::load("/config")?;
//! for baby in &config.tracker.babies {
//!     println!("{}", baby.baby_name);
//! }
//! ```

mod app_config;
mod error;
mod loader;
mod secrets;

pub use app_config::{AppConfig, BabyConfig, LoggerConfig, TrackerConfig};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;
