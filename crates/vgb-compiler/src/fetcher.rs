//! Guest media download.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};
use uuid::Uuid;
use vgb_media::MediaClip;
use vgb_models::Message;
use vgb_storage::ObjectStore;

use crate::error::CompileResult;
use crate::scratch::ScratchSpace;

/// Downloads message blobs into a job's scratch space.
#[derive(Clone)]
pub struct MediaFetcher {
    store: Arc<dyn ObjectStore>,
}

impl MediaFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Fetch every message's blob concurrently.
    ///
    /// Clips come back in message order. The first failure aborts the whole
    /// fetch; files already written stay reserved in `scratch` for cleanup.
    pub async fn fetch_all(
        &self,
        messages: &[Message],
        scratch: &mut ScratchSpace,
    ) -> CompileResult<Vec<MediaClip>> {
        let clips: Vec<MediaClip> = messages
            .iter()
            .enumerate()
            .map(|(index, message)| {
                let name = format!(
                    "src-{:03}-{}.{}",
                    index,
                    Uuid::new_v4().simple(),
                    message.media_type.extension()
                );
                MediaClip::new(
                    &message.id,
                    scratch.file(name),
                    &message.guest_name,
                    message.media_type,
                )
            })
            .collect();

        try_join_all(messages.iter().zip(&clips).map(|(message, clip)| async move {
            self.store.get_to_file(&message.media_key, &clip.path).await?;
            debug!(
                message_id = %message.id,
                key = %message.media_key,
                path = %clip.path.display(),
                "Fetched guest media"
            );
            CompileResult::Ok(())
        }))
        .await?;

        info!(count = clips.len(), "Fetched all guest media");
        Ok(clips)
    }
}
