//! In-process [`MetadataStore`] for tests and local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use vgb_models::{Event, EventId, Message};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{EventUpdate, MetadataStore};

/// Events and messages held in memory.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    events: RwLock<HashMap<EventId, Event>>,
    messages: RwLock<Vec<Message>>,
    failing: RwLock<HashSet<&'static str>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        self.events.write().await.insert(event.id.clone(), event);
    }

    pub async fn insert_message(&self, message: Message) {
        self.messages.write().await.push(message);
    }

    /// Make one operation (`get_event`, `update_event`, `list_messages`) fail.
    pub async fn fail_on(&self, operation: &'static str) {
        self.failing.write().await.insert(operation);
    }

    pub async fn event(&self, id: &EventId) -> Option<Event> {
        self.events.read().await.get(id).cloned()
    }

    async fn check(&self, operation: &'static str) -> FirestoreResult<()> {
        if self.failing.read().await.contains(operation) {
            return Err(FirestoreError::ServerError(
                503,
                format!("simulated {} failure", operation),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_event(&self, id: &EventId) -> FirestoreResult<Option<Event>> {
        self.check("get_event").await?;
        Ok(self.event(id).await)
    }

    async fn update_event(&self, id: &EventId, update: EventUpdate) -> FirestoreResult<()> {
        self.check("update_event").await?;
        let mut events = self.events.write().await;
        let event = events
            .get_mut(id)
            .ok_or_else(|| FirestoreError::not_found(format!("events/{}", id)))?;
        if let Some(key) = update.final_video_key {
            event.final_video_key = key;
        }
        Ok(())
    }

    async fn list_messages(&self, event_id: &EventId) -> FirestoreResult<Vec<Message>> {
        self.check("list_messages").await?;
        let mut messages: Vec<Message> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| &m.event_id == event_id)
            .cloned()
            .collect();
        // Stable, so equal timestamps keep insertion order.
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}
