//! Metadata store capability.
//!
//! The compiler only needs three things from the event store: read an event,
//! update its compiled-video key, and list its messages in creation order.

use async_trait::async_trait;
use tracing::instrument;

use vgb_models::{Event, EventId, Message};

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::repos::{EventRepository, MessageRepository};

/// Fields of an event the compiler may change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventUpdate {
    /// `Some(Some(key))` sets the key, `Some(None)` clears it, `None` leaves it.
    pub final_video_key: Option<Option<String>>,
}

impl EventUpdate {
    pub fn set_final_video_key(key: impl Into<String>) -> Self {
        Self {
            final_video_key: Some(Some(key.into())),
        }
    }

    pub fn clear_final_video_key() -> Self {
        Self {
            final_video_key: Some(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.final_video_key.is_none()
    }
}

/// Read/update access to events and their messages.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// `None` when the event does not exist.
    async fn get_event(&self, id: &EventId) -> FirestoreResult<Option<Event>>;

    async fn update_event(&self, id: &EventId, update: EventUpdate) -> FirestoreResult<()>;

    /// Messages of the event ordered by creation time, oldest first.
    async fn list_messages(&self, event_id: &EventId) -> FirestoreResult<Vec<Message>>;
}

/// [`MetadataStore`] backed by Firestore, with retries on transient errors.
#[derive(Clone)]
pub struct FirestoreMetadataStore {
    client: FirestoreClient,
    events: EventRepository,
    messages: MessageRepository,
}

impl FirestoreMetadataStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            events: EventRepository::new(client.clone()),
            messages: MessageRepository::new(client.clone()),
            client,
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        Ok(Self::new(FirestoreClient::from_env().await?))
    }
}

#[async_trait]
impl MetadataStore for FirestoreMetadataStore {
    #[instrument(skip(self), fields(event_id = %id))]
    async fn get_event(&self, id: &EventId) -> FirestoreResult<Option<Event>> {
        self.client
            .with_retry("get_event", || self.events.get(id))
            .await
    }

    #[instrument(skip(self, update), fields(event_id = %id))]
    async fn update_event(&self, id: &EventId, update: EventUpdate) -> FirestoreResult<()> {
        match update.final_video_key {
            Some(Some(key)) => {
                self.client
                    .with_retry("set_final_video_key", || {
                        self.events.set_final_video_key(id, &key)
                    })
                    .await
            }
            Some(None) => {
                self.client
                    .with_retry("clear_final_video_key", || {
                        self.events.clear_final_video_key(id)
                    })
                    .await
            }
            None => Ok(()),
        }
    }

    #[instrument(skip(self), fields(event_id = %event_id))]
    async fn list_messages(&self, event_id: &EventId) -> FirestoreResult<Vec<Message>> {
        self.client
            .with_retry("list_messages", || self.messages.list_by_event(event_id))
            .await
    }
}
