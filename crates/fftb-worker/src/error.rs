//! Worker error types.

use fftb_models::{DealerError, ErrorKind};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pull failed: {0}")]
    PullFailed(String),

    #[error("Push failed: {0}")]
    PushFailed(String),

    #[error("Dealer error: {0}")]
    Dealer(#[from] DealerError),

    #[error("Storage error: {0}")]
    Storage(#[from] fftb_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] fftb_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn pull_failed(msg: impl Into<String>) -> Self {
        Self::PullFailed(msg.into())
    }

    pub fn push_failed(msg: impl Into<String>) -> Self {
        Self::PushFailed(msg.into())
    }

    /// The run was stopped from outside, not by a broken segment.
    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Media(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Taxonomy member when the dealer rejected a call.
    pub fn dealer_kind(&self) -> Option<ErrorKind> {
        match self {
            WorkerError::Dealer(e) => Some(e.kind()),
            _ => None,
        }
    }
}
