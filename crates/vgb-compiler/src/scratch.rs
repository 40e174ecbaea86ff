//! Per-job scratch space.

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;
use vgb_media::fs_utils::{ensure_dir, remove_dir_if_empty, remove_files_best_effort};
use vgb_models::EventId;

use crate::error::CompileResult;

/// A job's private directory and every file path handed out inside it.
///
/// Paths are recorded when they are handed out, before anything is written,
/// so files left by a cancelled or failed step are still removed.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl ScratchSpace {
    /// Create `{work_dir}/{event_id}-{uuid}`.
    pub async fn create(work_dir: &Path, event_id: &EventId) -> CompileResult<Self> {
        let dir = work_dir.join(format!("{}-{}", sanitize(event_id.as_str()), Uuid::new_v4()));
        ensure_dir(&dir).await?;
        Ok(Self {
            dir,
            files: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve `name` inside the scratch directory.
    pub fn file(&mut self, name: impl AsRef<Path>) -> PathBuf {
        let path = self.dir.join(name);
        self.files.push(path.clone());
        path
    }

    /// Reserve a path created as a side effect of another file.
    pub fn track(&mut self, path: PathBuf) -> PathBuf {
        self.files.push(path.clone());
        path
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove every reserved file, then the directory.
    ///
    /// Returns the paths that could not be removed. Never fails.
    pub async fn cleanup(self) -> Vec<PathBuf> {
        let reserved = self.files.len();
        let mut failed = remove_files_best_effort(self.files).await;
        if !remove_dir_if_empty(&self.dir).await {
            failed.push(self.dir.clone());
        }
        debug!(
            dir = %self.dir.display(),
            reserved,
            failed = failed.len(),
            "Scratch space cleaned up"
        );
        failed
    }
}

/// Keep event ids from introducing path separators.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
