//! Error types for the tracker integration

use bct_core::EntityIdError;
use bct_registries::{ConfigEntriesError, StorageError};
use bct_service_registry::ServiceError;
use thiserror::Error;

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config entry error: {0}")]
    ConfigEntries(#[from] ConfigEntriesError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("invalid entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("config entry not found: {0}")]
    EntryNotFound(String),

    #[error("no baby named or with entry id '{0}'")]
    BabyNotFound(String),

    #[error("several babies are configured, pass `baby` to pick one")]
    AmbiguousBaby,

    #[error("no baby is configured")]
    NoBabies,

    #[error("invalid baby care action: {0}")]
    UnknownAction(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<TrackerError> for ServiceError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Service(inner) => inner,
            TrackerError::UnknownAction(_)
            | TrackerError::InvalidValue { .. }
            | TrackerError::InvalidEntityId(_)
            | TrackerError::BabyNotFound(_)
            | TrackerError::AmbiguousBaby
            | TrackerError::NoBabies => ServiceError::InvalidData(err.to_string()),
            other => ServiceError::CallFailed(other.to_string()),
        }
    }
}
