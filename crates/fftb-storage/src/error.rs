//! Storage error types.

use fftb_models::DealerError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage: {0}")]
    ConfigError(String),

    #[error("Storage claim already allocated: {0}")]
    AlreadyAllocated(String),

    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("Unknown storage claim type: {0}")]
    UnknownClaimType(String),

    #[error("Invalid claim id: {0}")]
    InvalidId(String),

    #[error("Invalid claim url: {0}")]
    InvalidUrl(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn already_allocated(id: impl Into<String>) -> Self {
        Self::AlreadyAllocated(id.into())
    }

    pub fn missing_file(id: impl Into<String>) -> Self {
        Self::MissingFile(id.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }
}

impl From<StorageError> for DealerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyAllocated(id) => DealerError::StorageClaimAlreadyAllocated(id),
            StorageError::MissingFile(id) => DealerError::MissingStorageClaim(id),
            StorageError::UnknownClaimType(scheme) => DealerError::UnknownStorageClaimType(scheme),
            other => DealerError::unknown(other.to_string()),
        }
    }
}
