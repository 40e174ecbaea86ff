//! Events and guest messages.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a guestbook event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Event record as far as compilation is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    /// Storage key of the compiled video. Present means "already compiled".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_video_key: Option<String>,
}

impl Event {
    pub fn new(id: impl Into<EventId>) -> Self {
        Self {
            id: id.into(),
            final_video_key: None,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.final_video_key
            .as_deref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }
}

/// Kind of media a guest recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// File extension used for the raw blob in scratch storage.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "webm",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown media type: {0}")]
pub struct ParseMediaKindError(pub String);

impl FromStr for MediaKind {
    type Err = ParseMediaKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(ParseMediaKindError(other.to_string())),
        }
    }
}

/// A guest message attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub event_id: EventId,
    /// Free text entered by the guest. Untrusted.
    pub guest_name: String,
    pub media_type: MediaKind,
    /// Object-store key of the recorded blob.
    pub media_key: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_parse() {
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert_eq!(" Audio ".parse::<MediaKind>().unwrap(), MediaKind::Audio);
        assert!("image".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_extensions_differ_by_kind() {
        assert_ne!(MediaKind::Audio.extension(), MediaKind::Video.extension());
    }

    #[test]
    fn test_event_is_compiled() {
        let mut event = Event::new("e1");
        assert!(!event.is_compiled());

        event.final_video_key = Some(String::new());
        assert!(!event.is_compiled());

        event.final_video_key = Some("compilations/e1/out.mp4".into());
        assert!(event.is_compiled());
    }

    #[test]
    fn test_message_serde_camel_case() {
        let json = serde_json::json!({
            "id": "m1",
            "eventId": "e1",
            "guestName": "Ann",
            "mediaType": "video",
            "mediaKey": "messages/m1.webm",
            "createdAt": "2024-05-01T12:00:00Z"
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg.guest_name, "Ann");
        assert_eq!(msg.media_type, MediaKind::Video);
        assert_eq!(msg.event_id.as_str(), "e1");
    }
}
