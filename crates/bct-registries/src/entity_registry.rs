//! Entity Registry
//!
//! Remembers which entities exist, which device and config entry they belong
//! to, and the unique id that keeps their entity_id stable across restarts.
//! Button-press events name a device; the tracker resolves them to entities
//! through [`EntityRegistry::get_by_device_id`].

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{load_storable, save_storable, Storable, Storage, StorageResult};

#[derive(Debug, Error, Clone)]
pub enum EntityRegistryError {
    #[error("Entity not found: {0}")]
    NotFound(String),
}

pub const STORAGE_KEY: &str = "core.entity_registry";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal ULID
    pub id: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,

    /// Integration that provides this entity
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            unique_id,
            device_id: None,
            config_entry_id: None,
            platform: platform.into(),
            original_name: None,
            original_icon: None,
            original_device_class: None,
            unit_of_measurement: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or(&self.entity_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Entity registry indexed by entity_id, unique_id, device and config entry
pub struct EntityRegistry {
    storage: Arc<Storage>,

    /// Primary index, insertion ordered
    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    by_unique_id: DashMap<String, String>,

    /// device_id -> entity_ids
    by_device_id: DashMap<String, HashSet<String>>,

    /// config_entry_id -> entity_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
            by_device_id: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = load_storable::<EntityRegistryData>(&self.storage).await? {
            info!("Loading {} entities from storage", data.entities.len());
            for entry in data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let data = EntityRegistryData {
            entities: self.iter().into_iter().map(|e| (*e).clone()).collect(),
        };
        save_storable(&self.storage, &data).await?;
        debug!("Saved {} entities to storage", data.entities.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id.insert(unique_id.clone(), entity_id.clone());
        }

        if let Some(ref device_id) = entry.device_id {
            self.by_device_id
                .entry(device_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Some(ref config_entry_id) = entry.config_entry_id {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.insert(entity_id, entry);
        }
    }

    /// Drop an entry from the secondary indexes
    fn unindex_secondary(&self, entry: &EntityEntry) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id.remove(unique_id);
        }
        if let Some(ref device_id) = entry.device_id {
            if let Some(mut ids) = self.by_device_id.get_mut(device_id) {
                ids.remove(&entry.entity_id);
            }
        }
        if let Some(ref config_entry_id) = entry.config_entry_id {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entry.entity_id);
            }
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|idx| idx.get(entity_id).cloned())
    }

    pub fn get_by_unique_id(&self, unique_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_unique_id
            .get(unique_id)
            .and_then(|entity_id| self.get(&entity_id))
    }

    /// All entities attached to a device, sorted by entity_id
    pub fn get_by_device_id(&self, device_id: &str) -> Vec<Arc<EntityEntry>> {
        let mut entries: Vec<_> = self
            .by_device_id
            .get(device_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entries
    }

    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Register an entity, or return the one already registered under the
    /// same unique_id or entity_id
    pub fn get_or_create(
        &self,
        platform: &str,
        entity_id: &str,
        unique_id: Option<&str>,
        config_entry_id: Option<&str>,
        device_id: Option<&str>,
    ) -> Arc<EntityEntry> {
        if let Some(uid) = unique_id {
            if let Some(existing) = self.get_by_unique_id(uid) {
                debug!("Found existing entity by unique_id: {}", existing.entity_id);
                return existing;
            }
        }

        if let Some(existing) = self.get(entity_id) {
            if existing.unique_id.is_none() && unique_id.is_some() {
                if let Ok(updated) = self.update(entity_id, |entry| {
                    entry.unique_id = unique_id.map(String::from);
                    entry.modified_at = Utc::now();
                }) {
                    return updated;
                }
            }
            return existing;
        }

        let mut entry = EntityEntry::new(entity_id, platform, unique_id.map(String::from));
        entry.config_entry_id = config_entry_id.map(String::from);
        entry.device_id = device_id.map(String::from);

        let entry = Arc::new(entry);
        self.index_entry(Arc::clone(&entry));

        info!("Registered new entity: {}", entity_id);
        entry
    }

    /// Apply `f` to a copy of the entry and re-index it
    pub fn update<F>(&self, entity_id: &str, f: F) -> Result<Arc<EntityEntry>, EntityRegistryError>
    where
        F: FnOnce(&mut EntityEntry),
    {
        let removed = self
            .by_entity_id
            .write()
            .ok()
            .and_then(|mut idx| idx.shift_remove(entity_id));

        let Some(old) = removed else {
            return Err(EntityRegistryError::NotFound(entity_id.to_string()));
        };

        self.unindex_secondary(&old);
        let mut entry = (*old).clone();
        f(&mut entry);

        let entry = Arc::new(entry);
        self.index_entry(Arc::clone(&entry));
        Ok(entry)
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let removed = self
            .by_entity_id
            .write()
            .ok()
            .and_then(|mut idx| idx.shift_remove(entity_id))?;

        self.unindex_secondary(&removed);
        info!("Removed entity: {}", entity_id);
        Some(removed)
    }

    pub fn is_registered(&self, entity_id: &str) -> bool {
        self.by_entity_id
            .read()
            .map(|idx| idx.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// Pick an entity_id that no other registered entity holds
    ///
    /// Appends `_2`, `_3`, ... to the preferred id until one is free. An
    /// entity asking again with its current id keeps that id.
    pub fn generate_entity_id(
        &self,
        domain: &str,
        suggested_object_id: &str,
        current_entity_id: Option<&str>,
    ) -> String {
        let preferred = format!("{}.{}", domain, suggested_object_id);
        let usable = |candidate: &str| {
            current_entity_id == Some(candidate) || !self.is_registered(candidate)
        };

        if usable(&preferred) {
            return preferred;
        }

        (2..)
            .map(|n| format!("{}_{}", preferred, n))
            .find(|candidate| usable(candidate.as_str()))
            .unwrap_or_else(|| preferred.clone())
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.read().map(|idx| idx.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries in insertion order
    pub fn iter(&self) -> Vec<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .map(|idx| idx.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> EntityRegistry {
        EntityRegistry::new(Arc::new(Storage::new(dir.path())))
    }

    #[test]
    fn test_get_or_create_is_idempotent_by_unique_id() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let first = reg.get_or_create("zha", "sensor.remote_action", Some("ieee-1"), None, Some("dev1"));
        let again = reg.get_or_create("zha", "sensor.other_name", Some("ieee-1"), None, None);

        assert_eq!(first.id, again.id);
        assert_eq!(again.entity_id, "sensor.remote_action");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_get_by_device_id() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        reg.get_or_create("zha", "sensor.remote_battery", None, None, Some("dev1"));
        reg.get_or_create("zha", "sensor.remote_action", None, None, Some("dev1"));
        reg.get_or_create("zha", "switch.lamp", None, None, Some("dev2"));

        let ids: Vec<_> = reg
            .get_by_device_id("dev1")
            .iter()
            .map(|e| e.entity_id.clone())
            .collect();
        assert_eq!(ids, vec!["sensor.remote_action", "sensor.remote_battery"]);
        assert!(reg.get_by_device_id("unknown").is_empty());
    }

    #[test]
    fn test_update_moves_device_index() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.get_or_create("zha", "sensor.remote_action", None, None, Some("dev1"));

        reg.update("sensor.remote_action", |e| e.device_id = Some("dev9".into()))
            .unwrap();

        assert!(reg.get_by_device_id("dev1").is_empty());
        assert_eq!(reg.get_by_device_id("dev9").len(), 1);
        assert!(matches!(
            reg.update("sensor.missing", |_| {}),
            Err(EntityRegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_generate_entity_id_suffixes() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.get_or_create("baby_care_tracker", "sensor.emma_sleep_status", None, None, None);

        assert_eq!(
            reg.generate_entity_id("sensor", "emma_sleep_status", None),
            "sensor.emma_sleep_status_2"
        );
        assert_eq!(
            reg.generate_entity_id(
                "sensor",
                "emma_sleep_status",
                Some("sensor.emma_sleep_status")
            ),
            "sensor.emma_sleep_status"
        );
        assert_eq!(
            reg.generate_entity_id("sensor", "liam_sleep_status", None),
            "sensor.liam_sleep_status"
        );
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.get_or_create("zha", "sensor.remote_action", Some("u1"), Some("entry1"), Some("dev1"));
        reg.save().await.unwrap();

        let reloaded = registry(&dir);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get_by_device_id("dev1").len(), 1);
        assert_eq!(reloaded.get_by_config_entry_id("entry1").len(), 1);
        assert!(reloaded.remove("sensor.remote_action").is_some());
        assert!(reloaded.is_empty());
    }
}
