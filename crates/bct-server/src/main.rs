//! Baby care tracker host
//!
//! Usage: `baby-care-tracker [CONFIG_DIR]` (default `config`). Reads
//! `configuration.yaml` and `.storage/` from the config directory, sets up
//! one tracker per baby and runs until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bct_config::AppConfig;
use bct_tracker::{BabyCareTracker, Hass, SystemClock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_DIR: &str = "config";

fn config_dir() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}

/// `RUST_LOG` wins over the `logger.default` level
fn env_filter(config: &AppConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logger.default))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir();
    let config = AppConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {:?}", config_dir))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config))
        .with_target(true)
        .try_init();

    info!(config_dir = ?config_dir, "Starting baby care tracker");

    let hass = Arc::new(Hass::new(&config_dir));
    hass.load_registries()
        .await
        .context("failed to load registries")?;

    let tracker = BabyCareTracker::with_update_interval(
        hass.clone(),
        Arc::new(SystemClock),
        std::time::Duration::from_secs(config.tracker.update_interval),
    );
    tracker
        .import_yaml(&config.tracker)
        .await
        .context("failed to import babies from configuration.yaml")?;

    let loaded = tracker.setup_all().await;
    if loaded == 0 {
        warn!("No babies configured; add one under baby_care_tracker.babies");
    }
    info!(babies = loaded, "Baby care tracker is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    tracker.unload_all().await;
    hass.save_registries()
        .await
        .context("failed to save registries")?;

    Ok(())
}
