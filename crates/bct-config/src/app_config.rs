//! Typed view of `configuration.yaml`
//!
//! Only two top-level sections are read: `logger:` and
//! `baby_care_tracker:`. Everything else is ignored.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

pub const TRACKER_SECTION: &str = "baby_care_tracker";
pub const LOGGER_SECTION: &str = "logger";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Default level for the `EnvFilter` when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub default: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Seconds between sensor refreshes
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    #[serde(default)]
    pub babies: Vec<BabyConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            babies: Vec::new(),
        }
    }
}

/// One baby declared in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BabyConfig {
    pub baby_name: String,

    #[serde(default)]
    pub birth_date: Option<NaiveDate>,

    /// Option key (`<action>_entity`) -> trigger spec
    #[serde(default)]
    pub mappings: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_update_interval() -> u64 {
    30
}

impl AppConfig {
    /// Load `configuration.yaml` from a config directory
    ///
    /// A missing file yields the defaults.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.join("configuration.yaml").exists() {
            debug!("No configuration.yaml in {:?}, using defaults", config_dir);
            return Ok(Self::default());
        }

        let yaml = load_yaml(config_dir, "configuration.yaml")?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let mapping = match yaml {
            Value::Mapping(mapping) => mapping.clone(),
            Value::Null => serde_yaml::Mapping::new(),
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "root".to_string(),
                    reason: "configuration must be a mapping".to_string(),
                })
            }
        };

        let logger: LoggerConfig = section(&mapping, LOGGER_SECTION)?;
        let tracker: TrackerConfig = section(&mapping, TRACKER_SECTION)?;

        let config = Self { logger, tracker };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.tracker.update_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: "baby_care_tracker.update_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for baby in &self.tracker.babies {
            let name = baby.baby_name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "baby_care_tracker.babies.baby_name".to_string(),
                    reason: "baby name cannot be empty".to_string(),
                });
            }
            if !seen.insert(name.to_string()) {
                return Err(ConfigError::InvalidValue {
                    key: "baby_care_tracker.babies.baby_name".to_string(),
                    reason: format!("duplicate baby name '{}'", name),
                });
            }
        }
        Ok(())
    }
}

/// Deserialize a top-level section, treating absent or empty as defaults
fn section<T>(mapping: &serde_yaml::Mapping, key: &str) -> ConfigResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match mapping.get(&Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> ConfigResult<AppConfig> {
        AppConfig::from_yaml(&serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
logger:
  default: debug
baby_care_tracker:
  update_interval: 10
  babies:
    - baby_name: Emma
      birth_date: 2025-08-01
      mappings:
        feeding_start_left_entity: switch.nursery_left
        diaper_pee_entity: "sensor.remote_action:single"
"#,
        )
        .unwrap();

        assert_eq!(config.logger.default, "debug");
        assert_eq!(config.tracker.update_interval, 10);
        let emma = &config.tracker.babies[0];
        assert_eq!(emma.baby_name, "Emma");
        assert_eq!(emma.birth_date, NaiveDate::from_ymd_opt(2025, 8, 1));
        let keys: Vec<_> = emma.mappings.keys().cloned().collect();
        assert_eq!(keys, vec!["feeding_start_left_entity", "diaper_pee_entity"]);
        assert_eq!(
            emma.mappings["diaper_pee_entity"],
            "sensor.remote_action:single"
        );
    }

    #[test]
    fn test_defaults() {
        let config = parse("homeassistant:\n  name: Home\n").unwrap();
        assert_eq!(config.logger.default, "info");
        assert_eq!(config.tracker.update_interval, 30);
        assert!(config.tracker.babies.is_empty());

        let empty_section = parse("baby_care_tracker:\n").unwrap();
        assert_eq!(empty_section.tracker.update_interval, 30);
    }

    #[test]
    fn test_rejects_duplicate_and_empty_names() {
        let dup = parse(
            "baby_care_tracker:\n  babies:\n    - baby_name: Emma\n    - baby_name: Emma\n",
        );
        assert!(matches!(dup, Err(ConfigError::InvalidValue { .. })));

        let empty = parse("baby_care_tracker:\n  babies:\n    - baby_name: \"  \"\n");
        assert!(matches!(empty, Err(ConfigError::InvalidValue { .. })));

        let zero = parse("baby_care_tracker:\n  update_interval: 0\n");
        assert!(matches!(zero, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(AppConfig::load(dir.path()).unwrap().tracker.update_interval, 30);

        fs::write(dir.path().join("secrets.yaml"), "first_baby: Liam\n").unwrap();
        fs::write(
            dir.path().join("configuration.yaml"),
            "baby_care_tracker:\n  babies:\n    - baby_name: !secret first_baby\n",
        )
        .unwrap();

        let config = AppConfig::load(dir.path()).unwrap();
        assert_eq!(config.tracker.babies[0].baby_name, "Liam");
    }
}
