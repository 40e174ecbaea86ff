//! Publishing compiled videos and managing them afterwards.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use vgb_firestore::{EventUpdate, MetadataStore};
use vgb_models::EventId;
use vgb_storage::keys::{compilation_key, OUTPUT_CONTENT_TYPE};
use vgb_storage::ObjectStore;

use crate::error::{CompileError, CompileResult};

/// A compiled video in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedOutput {
    pub key: String,
    pub url: String,
}

#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    url_ttl: Duration,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            metadata,
            url_ttl,
        }
    }

    /// Upload `local_path` under a fresh key and sign a URL for it.
    pub async fn publish(&self, event_id: &EventId, local_path: &Path) -> CompileResult<PublishedOutput> {
        let key = compilation_key(event_id);
        self.store
            .put_file(&key, local_path, OUTPUT_CONTENT_TYPE)
            .await?;

        let url = match self.store.signed_url(&key, self.url_ttl).await {
            Ok(url) => url,
            Err(e) => {
                self.discard(&key).await;
                return Err(e.into());
            }
        };

        info!(event_id = %event_id, key = %key, "Published compilation");
        Ok(PublishedOutput { key, url })
    }

    /// Best-effort removal of an upload that will not be recorded.
    pub async fn discard(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key = %key, error = %e, "Failed to delete orphaned output");
        }
    }

    /// Fresh signed URL for the event's recorded output.
    pub async fn access_url(&self, event_id: &EventId) -> CompileResult<String> {
        let key = self.recorded_key(event_id).await?;
        Ok(self.store.signed_url(&key, self.url_ttl).await?)
    }

    /// Delete the event's output and clear its key so it can be compiled again.
    pub async fn remove(&self, event_id: &EventId) -> CompileResult<()> {
        let key = self.recorded_key(event_id).await?;
        self.store.delete(&key).await?;
        self.metadata
            .update_event(event_id, EventUpdate::clear_final_video_key())
            .await?;
        info!(event_id = %event_id, key = %key, "Removed compilation");
        Ok(())
    }

    async fn recorded_key(&self, event_id: &EventId) -> CompileResult<String> {
        let event = self
            .metadata
            .get_event(event_id)
            .await?
            .ok_or_else(|| CompileError::EventNotFound(event_id.clone()))?;
        event
            .final_video_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CompileError::NoOutput(event_id.clone()))
    }
}
