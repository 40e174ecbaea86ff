//! Outbound webhook payloads.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CompilationStatus, EventId};

/// Body POSTed to a caller-supplied webhook when a compilation finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event_id: EventId,
    pub status: CompilationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookPayload {
    pub fn completed(event_id: EventId, output_url: impl Into<String>) -> Self {
        Self {
            event_id,
            status: CompilationStatus::Completed,
            output_url: Some(output_url.into()),
            error: None,
        }
    }

    pub fn failed(event_id: EventId, error: impl Into<String>) -> Self {
        Self {
            event_id,
            status: CompilationStatus::Failed,
            output_url: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookUrlError {
    #[error("webhook URL is not a valid absolute URL: {0}")]
    Invalid(String),

    #[error("webhook URL must use http or https, got {0}")]
    UnsupportedScheme(String),
}

/// Parse a caller-supplied webhook URL, accepting only absolute http(s) URLs.
pub fn validate_webhook_url(raw: &str) -> Result<Url, WebhookUrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| WebhookUrlError::Invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(WebhookUrlError::Invalid("missing host".into())),
        other => Err(WebhookUrlError::UnsupportedScheme(other.to_string())),
    }
}
