//! Typed repositories for events and guest messages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use vgb_models::{Event, EventId, MediaKind, Message};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, StructuredQuery, ToFirestoreValue, Value};

/// Event document field holding the compiled video's storage key.
pub const FINAL_VIDEO_KEY_FIELD: &str = "finalVideoKey";
const UPDATED_AT_FIELD: &str = "updatedAt";

/// Repository for event documents.
#[derive(Clone)]
pub struct EventRepository {
    client: FirestoreClient,
    collection: String,
}

impl EventRepository {
    pub fn new(client: FirestoreClient) -> Self {
        let collection = client.config().events_collection.clone();
        Self { client, collection }
    }

    /// Get an event by ID.
    pub async fn get(&self, event_id: &EventId) -> FirestoreResult<Option<Event>> {
        let doc = self
            .client
            .get_document(&self.collection, event_id.as_str())
            .await?;
        Ok(doc.map(|d| document_to_event(&d, event_id)))
    }

    /// Record the storage key of the compiled video.
    pub async fn set_final_video_key(&self, event_id: &EventId, key: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert(FINAL_VIDEO_KEY_FIELD.to_string(), key.to_firestore_value());
        fields.insert(UPDATED_AT_FIELD.to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                &self.collection,
                event_id.as_str(),
                fields,
                &[FINAL_VIDEO_KEY_FIELD, UPDATED_AT_FIELD],
            )
            .await?;
        info!("Stored final video key for event {}", event_id);
        Ok(())
    }

    /// Remove the compiled video's key so the event can be compiled again.
    pub async fn clear_final_video_key(&self, event_id: &EventId) -> FirestoreResult<()> {
        // Masked but absent from the body, so Firestore deletes the field.
        let mut fields = HashMap::new();
        fields.insert(UPDATED_AT_FIELD.to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                &self.collection,
                event_id.as_str(),
                fields,
                &[FINAL_VIDEO_KEY_FIELD, UPDATED_AT_FIELD],
            )
            .await?;
        info!("Cleared final video key for event {}", event_id);
        Ok(())
    }
}

/// Repository for guest message documents.
#[derive(Clone)]
pub struct MessageRepository {
    client: FirestoreClient,
    collection: String,
}

impl MessageRepository {
    pub fn new(client: FirestoreClient) -> Self {
        let collection = client.config().messages_collection.clone();
        Self { client, collection }
    }

    /// Messages of an event, oldest first.
    pub async fn list_by_event(&self, event_id: &EventId) -> FirestoreResult<Vec<Message>> {
        let query = StructuredQuery::collection(&self.collection)
            .where_eq("eventId", Value::StringValue(event_id.as_str().to_string()))
            .order_by_asc("createdAt");

        let docs = self.client.run_query("", query).await?;
        let messages = docs
            .iter()
            .map(document_to_message)
            .collect::<FirestoreResult<Vec<_>>>()?;

        debug!(event_id = %event_id, count = messages.len(), "Listed messages");
        Ok(messages)
    }
}

// ============================================================================
// Document conversion
// ============================================================================

fn document_to_event(doc: &Document, event_id: &EventId) -> Event {
    Event {
        id: event_id.clone(),
        final_video_key: doc
            .get::<String>(FINAL_VIDEO_KEY_FIELD)
            .filter(|k| !k.is_empty()),
    }
}

fn document_to_message(doc: &Document) -> FirestoreResult<Message> {
    let id = doc
        .id()
        .ok_or_else(|| FirestoreError::invalid_document("message document has no name"))?
        .to_string();

    let required = |field: &str| -> FirestoreResult<String> {
        doc.get::<String>(field).ok_or_else(|| {
            FirestoreError::invalid_document(format!("message {} is missing {}", id, field))
        })
    };

    let media_type: MediaKind = required("mediaType")?
        .parse()
        .map_err(|e| FirestoreError::invalid_document(format!("message {}: {}", id, e)))?;

    let created_at = doc
        .get::<DateTime<Utc>>("createdAt")
        .or_else(|| doc.create_time.as_deref().and_then(parse_timestamp))
        .ok_or_else(|| {
            FirestoreError::invalid_document(format!("message {} is missing createdAt", id))
        })?;

    Ok(Message {
        event_id: EventId::new(required("eventId")?),
        guest_name: doc.get::<String>("guestName").unwrap_or_default(),
        media_type,
        media_key: required("mediaKey")?,
        created_at,
        id,
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use wiremock::matchers::{body_partial_json, method, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> FirestoreClient {
        FirestoreClient::with_static_token(
            FirestoreConfig::new("p"),
            format!("{}/v1/projects/p/databases/(default)/documents", server.uri()),
            "t",
        )
        .unwrap()
    }

    fn message_json(id: &str, guest: &str, kind: &str, created: &str) -> serde_json::Value {
        serde_json::json!({
            "document": {
                "name": format!("projects/p/databases/(default)/documents/messages/{}", id),
                "fields": {
                    "eventId": {"stringValue": "E1"},
                    "guestName": {"stringValue": guest},
                    "mediaType": {"stringValue": kind},
                    "mediaKey": {"stringValue": format!("uploads/E1/{}", id)},
                    "createdAt": {"timestampValue": created}
                }
            }
        })
    }

    #[test]
    fn test_document_to_event_treats_empty_key_as_absent() {
        let mut fields = HashMap::new();
        fields.insert(FINAL_VIDEO_KEY_FIELD.to_string(), Value::StringValue(String::new()));
        let event = document_to_event(&Document::new(fields), &EventId::new("E1"));
        assert!(!event.is_compiled());
    }

    #[test]
    fn test_document_to_message_rejects_unknown_media_type() {
        let doc: Document = serde_json::from_value(serde_json::json!({
            "name": "x/messages/m1",
            "fields": {
                "eventId": {"stringValue": "E1"},
                "mediaType": {"stringValue": "image"},
                "mediaKey": {"stringValue": "k"},
                "createdAt": {"timestampValue": "2024-05-01T12:00:00Z"}
            }
        }))
        .unwrap();
        assert!(matches!(
            document_to_message(&doc),
            Err(FirestoreError::InvalidDocument(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_event_preserves_query_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":runQuery$"))
            .and(body_partial_json(serde_json::json!({
                "structuredQuery": {
                    "where": {"fieldFilter": {"field": {"fieldPath": "eventId"}, "op": "EQUAL"}},
                    "orderBy": [{"field": {"fieldPath": "createdAt"}, "direction": "ASCENDING"}]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                message_json("m1", "Ann", "video", "2024-05-01T12:00:00Z"),
                message_json("m2", "Bo", "audio", "2024-05-01T12:01:00Z"),
                message_json("m3", "Cy", "video", "2024-05-01T12:02:00Z"),
            ])))
            .mount(&server)
            .await;

        let repo = MessageRepository::new(client_for(&server));
        let messages = repo.list_by_event(&EventId::new("E1")).await.unwrap();

        let names: Vec<&str> = messages.iter().map(|m| m.guest_name.as_str()).collect();
        assert_eq!(names, vec!["Ann", "Bo", "Cy"]);
        assert_eq!(messages[1].media_type, MediaKind::Audio);
        assert_eq!(messages[0].media_key, "uploads/E1/m1");
    }

    #[tokio::test]
    async fn test_clear_final_video_key_masks_field_without_value() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path_regex(r"/events/E1$"))
            .and(query_param("updateMask.fieldPaths", FINAL_VIDEO_KEY_FIELD))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let repo = EventRepository::new(client_for(&server));
        repo.clear_final_video_key(&EventId::new("E1")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["fields"].get(FINAL_VIDEO_KEY_FIELD).is_none());
        assert!(body["fields"].get(UPDATED_AT_FIELD).is_some());
    }
}
