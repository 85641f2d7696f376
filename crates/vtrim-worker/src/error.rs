//! Worker error types.

use thiserror::Error;
use vtrim_models::{FailureKind, JobFailure};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] vtrim_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] vtrim_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] vtrim_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map onto the pipeline failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Media(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Queue(e) => e.kind(),
            Self::ConfigError(_) | Self::Io(_) | Self::Internal(_) => {
                FailureKind::InternalFault
            }
        }
    }

    /// Terse failure for the `failed` event; details stay in the logs.
    pub fn to_failure(&self) -> JobFailure {
        match self {
            Self::Media(e) => JobFailure::new(e.kind(), e.client_message()),
            other => JobFailure::from(other.kind()),
        }
    }
}
