//! Storage error types.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage misconfigured: {0}")]
    Config(String),

    #[error("No object at key {0}")]
    NotFound(String),

    /// A backend call failed for a reason other than a missing key.
    #[error("{op} {key} failed: {message}")]
    Request {
        op: &'static str,
        key: String,
        message: String,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn request(op: &'static str, key: &str, message: impl ToString) -> Self {
        Self::Request {
            op,
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
