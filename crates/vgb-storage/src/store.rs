//! Object storage capability.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageResult;

/// What the compiler needs from object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the bytes stored at `key`.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Store `data` at `key`, returning the key.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Time-limited URL granting read access to `key`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Fetch `key` into a local file.
    async fn get_to_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        let data = self.get(key).await?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    /// Store a local file at `key`.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<String> {
        let data = tokio::fs::read(path).await?;
        self.put(key, data, content_type).await
    }
}
