//! Names shared across the integration

use std::time::Duration;

pub const DOMAIN: &str = "baby_care_tracker";

pub const CONF_BABY_NAME: &str = "baby_name";
pub const CONF_BIRTH_DATE: &str = "birth_date";

pub const DEFAULT_NAME: &str = "Baby";

pub const STORAGE_VERSION: u32 = 1;

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Note attached to commands fired by a mapped entity or button
pub const NOTE_BUTTON_TRIGGERED: &str = "Button triggered";
/// Note on a feeding closed because another one started
pub const NOTE_SWITCHING_SIDES: &str = "Switching sides";
/// Note on a sleep closed because another one started
pub const NOTE_NEW_SLEEP: &str = "New sleep session started";

pub const SERVICE_START_FEEDING: &str = "start_feeding";
pub const SERVICE_STOP_FEEDING: &str = "stop_feeding";
pub const SERVICE_LOG_DIAPER: &str = "log_diaper";
pub const SERVICE_LOG_SLEEP_START: &str = "log_sleep_start";
pub const SERVICE_LOG_WAKE_UP: &str = "log_wake_up";
pub const SERVICE_LOG_BOTTLE_FEEDING: &str = "log_bottle_feeding";
pub const SERVICE_LOG_GROWTH: &str = "log_growth";
pub const SERVICE_UPDATE_BUTTON_MAPPING: &str = "update_button_mapping";
pub const SERVICE_REMOVE_BUTTON_MAPPING: &str = "remove_button_mapping";

pub const SERVICES: &[&str] = &[
    SERVICE_START_FEEDING,
    SERVICE_STOP_FEEDING,
    SERVICE_LOG_DIAPER,
    SERVICE_LOG_SLEEP_START,
    SERVICE_LOG_WAKE_UP,
    SERVICE_LOG_BOTTLE_FEEDING,
    SERVICE_LOG_GROWTH,
    SERVICE_UPDATE_BUTTON_MAPPING,
    SERVICE_REMOVE_BUTTON_MAPPING,
];

pub const DEVICE_MANUFACTURER: &str = "Baby Care Tracker";
pub const DEVICE_MODEL: &str = "Baby Monitor";

/// Store key of one baby's activity document
pub fn storage_key(entry_id: &str) -> String {
    format!("{}_{}", DOMAIN, entry_id)
}

/// Title given to a baby's config entry
pub fn entry_title(baby_name: &str) -> String {
    format!("Baby Care - {}", baby_name)
}
