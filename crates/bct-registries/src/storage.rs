//! JSON persistence under `.storage/`
//!
//! Every document is wrapped in a versioned envelope:
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 1,
//!   "key": "baby_care_tracker_01J...",
//!   "data": { ... }
//! }
//! ```
//! Saves write a temp file and rename it over the target, so a crash mid-save
//! leaves the previous document intact.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch for {key}: expected {expected}, found {found}")]
    VersionMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    pub version: u32,
    #[serde(default = "default_minor_version")]
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

fn default_minor_version() -> u32 {
    1
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Handle on the `.storage/` directory of a config dir
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub async fn ensure_dir(&self) -> StorageResult<()> {
        if !self.storage_dir.exists() {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!("Created storage directory: {:?}", self.storage_dir);
        }
        Ok(())
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }

    /// Load a document, `None` if it was never saved
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.file_path(key);

        if !path.exists() {
            debug!("Storage file not found: {}", key);
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let storage_file: StorageFile<T> = serde_json::from_str(&content)?;

        debug!(
            "Loaded storage file: {} (v{}.{})",
            key, storage_file.version, storage_file.minor_version
        );

        Ok(Some(storage_file))
    }

    pub async fn save<T>(&self, storage_file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        self.ensure_dir().await?;

        let path = self.file_path(&storage_file.key);
        let temp_path = self.file_path(&format!("{}.tmp", storage_file.key));

        let content = serde_json::to_string_pretty(storage_file)?;
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(
            "Saved storage file: {} (v{}.{})",
            storage_file.key, storage_file.version, storage_file.minor_version
        );

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.file_path(key);
        if path.exists() {
            fs::remove_file(&path).await?;
            debug!("Deleted storage file: {}", key);
        }
        Ok(())
    }
}

/// Types persisted under a fixed key
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

/// A single document of type `T` at a key chosen at runtime
///
/// Integrations that keep one document per config entry use this instead
/// of [`Storable`], since their key embeds the entry id.
pub struct Store<T> {
    storage: Arc<Storage>,
    key: String,
    version: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(storage: Arc<Storage>, version: u32, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            version,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the document; a missing file yields `None`
    ///
    /// Documents are never migrated. A file written by a different major
    /// version is refused rather than misread.
    pub async fn load(&self) -> StorageResult<Option<T>> {
        let Some(file) = self.storage.load::<T>(&self.key).await? else {
            return Ok(None);
        };

        if file.version != self.version {
            warn!(
                key = %self.key,
                expected = self.version,
                found = file.version,
                "Refusing to load storage file with unexpected version"
            );
            return Err(StorageError::VersionMismatch {
                key: self.key.clone(),
                expected: self.version,
                found: file.version,
            });
        }

        Ok(Some(file.data))
    }

    /// Overwrite the whole document
    pub async fn save(&self, data: &T) -> StorageResult<()> {
        let file = StorageFile::new(self.key.as_str(), data, self.version, 1);
        self.storage.save(&file).await
    }

    pub async fn remove(&self) -> StorageResult<()> {
        self.storage.delete(&self.key).await
    }
}

/// Load a [`Storable`] document
pub async fn load_storable<T: Storable>(storage: &Storage) -> StorageResult<Option<T>> {
    let Some(file) = storage.load::<T>(T::KEY).await? else {
        return Ok(None);
    };

    if file.version != T::VERSION {
        return Err(StorageError::VersionMismatch {
            key: T::KEY.to_string(),
            expected: T::VERSION,
            found: file.version,
        });
    }

    if file.minor_version < T::MINOR_VERSION {
        warn!(
            "Storage {} has older minor version ({} < {})",
            T::KEY,
            file.minor_version,
            T::MINOR_VERSION
        );
    }

    Ok(Some(file.data))
}

/// Save a [`Storable`] document
pub async fn save_storable<T: Storable>(storage: &Storage, data: &T) -> StorageResult<()> {
    storage
        .save(&StorageFile::new(T::KEY, data, T::VERSION, T::MINOR_VERSION))
        .await
}
