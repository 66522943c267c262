//! Registry error types.

use fftb_models::{DealerError, ValidationError};
use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Unexpected object type `{found}`, expected `{expected}`")]
    UnexpectedObjectType { expected: String, found: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Storage file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RegistryError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<RegistryError> for DealerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(key) => DealerError::NotFound(key),
            RegistryError::Invalid(validation) => DealerError::Invalid(validation),
            other => DealerError::unknown(other.to_string()),
        }
    }
}
