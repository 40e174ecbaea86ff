//! Clips staged for one compilation run.

use std::path::{Path, PathBuf};

use vgb_models::MediaKind;

/// One guest message fetched to local scratch storage.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaClip {
    pub message_id: String,
    pub path: PathBuf,
    /// Untrusted display text for the overlay
    pub guest_name: String,
    pub kind: MediaKind,
}

impl MediaClip {
    pub fn new(
        message_id: impl Into<String>,
        path: impl AsRef<Path>,
        guest_name: impl Into<String>,
        kind: MediaKind,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            path: path.as_ref().to_path_buf(),
            guest_name: guest_name.into(),
            kind,
        }
    }
}

/// A clip after conversion to the canonical profile with the overlay burned in.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedClip {
    pub message_id: String,
    pub path: PathBuf,
}
