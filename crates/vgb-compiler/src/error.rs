//! Compilation error types.

use std::time::Duration;

use thiserror::Error;
use vgb_firestore::FirestoreError;
use vgb_media::MediaError;
use vgb_models::EventId;
use vgb_storage::StorageError;

pub type CompileResult<T> = Result<T, CompileError>;

/// How a failure should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Event or required resource missing. Not retried.
    NotFound,
    /// Caller action needed first (already compiled, no messages, busy).
    PreconditionFailed,
    /// Storage, metadata or transcode failure. The caller may trigger again.
    TransientIo,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    #[error("Event {0} has already been compiled")]
    AlreadyCompiled(EventId),

    #[error("Event {0} has no messages to compile")]
    NoMessages(EventId),

    #[error("A compilation is already running for event {0}")]
    InProgress(EventId),

    #[error("Event {0} has no compiled video")]
    NoOutput(EventId),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EventNotFound(_) | Self::NoOutput(_) => ErrorKind::NotFound,
            Self::AlreadyCompiled(_) | Self::NoMessages(_) | Self::InProgress(_) => {
                ErrorKind::PreconditionFailed
            }
            Self::Timeout(..)
            | Self::ConfigError(_)
            | Self::Storage(_)
            | Self::Metadata(_)
            | Self::Media(_)
            | Self::Io(_) => ErrorKind::TransientIo,
        }
    }

    /// Guard failures happen before a job starts and leave status untouched.
    pub fn is_guard_failure(&self) -> bool {
        matches!(
            self,
            Self::EventNotFound(_) | Self::AlreadyCompiled(_) | Self::InProgress(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let id = EventId::new("E1");
        assert_eq!(CompileError::EventNotFound(id.clone()).kind(), ErrorKind::NotFound);
        assert_eq!(
            CompileError::AlreadyCompiled(id.clone()).kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(CompileError::NoMessages(id.clone()).kind(), ErrorKind::PreconditionFailed);
        assert_eq!(CompileError::Timeout("normalize", Duration::from_secs(30)).kind(), ErrorKind::TransientIo);
        assert_eq!(
            CompileError::from(StorageError::not_found("k")).kind(),
            ErrorKind::TransientIo
        );
    }

    #[test]
    fn test_no_messages_is_not_a_guard_failure() {
        let id = EventId::new("E1");
        assert!(CompileError::AlreadyCompiled(id.clone()).is_guard_failure());
        assert!(!CompileError::NoMessages(id).is_guard_failure());
    }
}
