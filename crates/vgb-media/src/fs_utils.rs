//! Scratch file helpers.
//!
//! Cleanup here is best-effort: every path is attempted, failures are
//! logged and counted, and nothing is propagated.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use crate::error::MediaResult;

/// Create `dir` and its parents if missing.
pub async fn ensure_dir(dir: impl AsRef<Path>) -> MediaResult<()> {
    fs::create_dir_all(dir.as_ref()).await?;
    Ok(())
}

/// Remove a file. Missing files count as removed.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> std::io::Result<()> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove every path in `paths`, returning the ones that could not be removed.
pub async fn remove_files_best_effort<I>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut failed = Vec::new();
    for path in paths {
        if let Err(e) = remove_file_if_exists(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
            failed.push(path);
        }
    }
    failed
}

/// Remove `dir` if it is empty. Returns whether it is gone.
pub async fn remove_dir_if_empty(dir: impl AsRef<Path>) -> bool {
    let dir = dir.as_ref();
    match fs::remove_dir(dir).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Scratch directory not removed");
            false
        }
    }
}
