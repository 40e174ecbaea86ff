//! Object key layout.

use uuid::Uuid;
use vgb_models::EventId;

use crate::error::{StorageError, StorageResult};

/// Content type of compiled videos.
pub const OUTPUT_CONTENT_TYPE: &str = "video/mp4";

/// Key prefix of all compiled videos.
pub const COMPILATIONS_PREFIX: &str = "compilations";

/// Fresh key for a compiled video of `event_id`.
///
/// Each compilation gets its own key so a stale signed URL never serves a
/// newer compilation.
pub fn compilation_key(event_id: &EventId) -> String {
    format!("{}/{}/{}.mp4", COMPILATIONS_PREFIX, event_id, Uuid::new_v4())
}

/// Reject keys that would escape their prefix or are empty.
pub fn validate_key(key: &str) -> StorageResult<&str> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|s| s == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(key)
}
