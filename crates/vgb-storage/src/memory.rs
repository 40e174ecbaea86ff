//! In-memory object store for local runs and tests.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;
use crate::store::ObjectStore;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// Object store backed by a map.
///
/// Keys registered with [`fail_on`](Self::fail_on) make every operation on
/// them fail, which simulates an unreachable backend.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    failing: RwLock<HashSet<String>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub async fn fail_on(&self, key: impl Into<String>) {
        self.failing.write().await.insert(key.into());
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }

    /// Keys starting with `prefix`, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    async fn check_failing(&self, key: &str, op: &'static str) -> StorageResult<()> {
        if self.failing.read().await.contains(key) {
            return Err(StorageError::request(op, key, "simulated backend failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.check_failing(key, "get").await?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        self.check_failing(key, "put").await?;
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check_failing(key, "delete").await?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        self.check_failing(key, "presign").await?;
        if !self.contains(key).await {
            return Err(StorageError::not_found(key));
        }
        Ok(format!("memory://{}?expires_in={}", key, ttl.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryObjectStore::new();
        store.put("a/b.mp4", b"video".to_vec(), "video/mp4").await.unwrap();

        assert_eq!(store.get("a/b.mp4").await.unwrap(), b"video");
        assert_eq!(store.content_type("a/b.mp4").await.as_deref(), Some("video/mp4"));

        store.delete("a/b.mp4").await.unwrap();
        assert!(store.get("a/b.mp4").await.unwrap_err().is_not_found());
        // Deleting again is fine.
        store.delete("a/b.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_signed_url_requires_object() {
        let store = InMemoryObjectStore::new();
        assert!(store.signed_url("x", Duration::from_secs(60)).await.is_err());

        store.insert("x", b"1".to_vec()).await;
        let url = store.signed_url("x", Duration::from_secs(60)).await.unwrap();
        assert_eq!(url, "memory://x?expires_in=60");
    }

    #[tokio::test]
    async fn test_fail_on() {
        let store = InMemoryObjectStore::new();
        store.insert("m2", b"data".to_vec()).await;
        store.fail_on("m2").await;
        assert!(matches!(store.get("m2").await, Err(StorageError::Request { op: "get", .. })));
    }

    #[tokio::test]
    async fn test_file_helpers() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = InMemoryObjectStore::new();
        store.insert("in", b"clip".to_vec()).await;

        let local = dir.path().join("clip.webm");
        store.get_to_file("in", &local).await.unwrap();
        assert_eq!(tokio::fs::read(&local).await.unwrap(), b"clip");

        store.put_file("out", &local, "video/mp4").await.unwrap();
        assert_eq!(store.get("out").await.unwrap(), b"clip");
    }
}
