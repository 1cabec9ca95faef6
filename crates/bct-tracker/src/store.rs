//! Persistence of a baby's activity document

use std::sync::Arc;

use async_trait::async_trait;
use bct_registries::{Storage, StorageResult, Store};

use crate::consts::{storage_key, STORAGE_VERSION};
use crate::session::TrackerData;

/// Where a coordinator loads and saves its [`TrackerData`]
///
/// The document is always written whole.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// A missing document yields `None`
    async fn load(&self) -> StorageResult<Option<TrackerData>>;

    async fn save(&self, data: &TrackerData) -> StorageResult<()>;

    /// Delete the document
    async fn remove(&self) -> StorageResult<()>;
}

#[async_trait]
impl ActivityStore for Store<TrackerData> {
    async fn load(&self) -> StorageResult<Option<TrackerData>> {
        Store::load(self).await
    }

    async fn save(&self, data: &TrackerData) -> StorageResult<()> {
        Store::save(self, data).await
    }

    async fn remove(&self) -> StorageResult<()> {
        Store::remove(self).await
    }
}

/// `.storage/baby_care_tracker_<entry_id>`
pub fn entry_store(storage: Arc<Storage>, entry_id: &str) -> Arc<dyn ActivityStore> {
    Arc::new(Store::<TrackerData>::new(
        storage,
        STORAGE_VERSION,
        storage_key(entry_id),
    ))
}
