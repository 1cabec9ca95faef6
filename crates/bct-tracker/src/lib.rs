//! Baby care tracker integration
//!
//! Tracks feedings, sleep, diapers, bottle feedings and growth for one or
//! more babies. Each baby is a config entry with its own coordinator, an
//! activity log persisted under `.storage/`, a set of published sensors and
//! an optional table mapping physical switches and remote buttons to
//! tracker actions.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bct_tracker::{BabyCareTracker, Hass, SystemClock};
//!
//! let hass = Arc::new(Hass::new("/config"));
//! hass.load_registries().await?;
//! let tracker = BabyCareTracker::new(hass, Arc::new(SystemClock));
//! tracker.import_yaml(&config.tracker).await?;
//! tracker.setup_all().await;
//! ```

pub mod action;
pub mod activity;
pub mod clock;
pub mod consts;
pub mod coordinator;
pub mod dispatch;
mod error;
pub mod hass;
pub mod integration;
pub mod listener;
pub mod mapping;
pub mod sensor;
pub mod services;
pub mod session;
pub mod store;
pub mod worker;

pub use action::{Command, MappedAction, TriggerSpec};
pub use activity::{ActivityKind, ActivityRecord, ActivityType, DiaperType, FeedingSide};
pub use clock::{Clock, MockClock, SystemClock};
pub use coordinator::BabyCoordinator;
pub use error::{TrackerError, TrackerResult};
pub use hass::{Hass, SharedHass};
pub use integration::{BabyCareTracker, EntryRuntime};
pub use mapping::{MappingTable, Options};
pub use sensor::{BabySensors, SensorKey, SensorReading};
pub use session::{FeedingSession, SleepSession, Started, TrackerData};
pub use store::ActivityStore;
pub use worker::{CommandSender, CommandWorker};
