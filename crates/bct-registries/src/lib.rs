//! Persistent registries for the baby care tracker host
//!
//! - `.storage/` JSON persistence ([`Storage`], [`Store`])
//! - Entities ([`EntityRegistry`])
//! - Devices ([`DeviceRegistry`])
//! - Config entries ([`ConfigEntries`])

pub mod storage;

pub mod config_entries;
pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult, Store};

pub use config_entries::{
    ConfigEntries, ConfigEntriesError, ConfigEntriesResult, ConfigEntry, ConfigEntrySource,
    ConfigEntryState,
};
pub use device_registry::{DeviceEntry, DeviceIdentifier, DeviceInfo, DeviceRegistry};
pub use entity_registry::{EntityEntry, EntityRegistry, EntityRegistryError};

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
    pub config_entries: ConfigEntries,
}

impl Registries {
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));

        Self {
            entities: EntityRegistry::new(storage.clone()),
            devices: DeviceRegistry::new(storage.clone()),
            config_entries: ConfigEntries::new(storage.clone()),
            storage,
        }
    }

    pub async fn load_all(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        self.config_entries.load().await?;
        Ok(())
    }

    /// Save the entity and device registries
    ///
    /// Config entries save themselves on every change.
    pub async fn save_all(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        Ok(())
    }
}
