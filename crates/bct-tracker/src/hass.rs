//! The host the integration runs on
//!
//! Bundles the event bus, state store, service registry and persistent
//! registries. Every handler receives this explicitly instead of looking
//! anything up globally.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bct_event_bus::{EventBus, SharedEventBus};
use bct_registries::{Registries, StorageResult};
use bct_service_registry::{ServiceRegistry, SharedServiceRegistry};
use bct_state_store::{SharedStateStore, StateStore};

pub struct Hass {
    pub config_dir: PathBuf,
    pub bus: SharedEventBus,
    pub states: SharedStateStore,
    pub services: SharedServiceRegistry,
    pub registries: Arc<Registries>,
}

impl Hass {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let config_dir = config_dir.as_ref().to_path_buf();
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));

        Self {
            registries: Arc::new(Registries::new(&config_dir)),
            services: Arc::new(ServiceRegistry::new()),
            states,
            bus,
            config_dir,
        }
    }

    /// Load entity, device and config entry registries from `.storage/`
    pub async fn load_registries(&self) -> StorageResult<()> {
        self.registries.load_all().await
    }

    pub async fn save_registries(&self) -> StorageResult<()> {
        self.registries.save_all().await
    }
}

pub type SharedHass = Arc<Hass>;
