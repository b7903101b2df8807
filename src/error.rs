use thiserror::Error;
use uuid::Uuid;

use crate::orchestrator::OrchestratorError;
use crate::storage::StorageError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job configuration: {0}")]
    Validation(String),

    #[error("secret does not match job {0}")]
    Unauthorized(Uuid),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {0} has already been started")]
    AlreadyStarted(Uuid),

    #[error("status update queue is full")]
    QueueFull,

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    #[error("object storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
