//! Compile trigger and status polling.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;
use vgb_models::{validate_webhook_url, CompilationJob, CompilationStatus, EventId};

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_event_id;
use crate::metrics::record_compile_trigger;
use crate::state::AppState;

/// Optional body of `POST /compile/{eventId}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl CompileRequest {
    /// Parse the raw body. An empty body is a request without webhook.
    fn from_body(body: &[u8]) -> ApiResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
    }

    fn webhook(&self) -> ApiResult<Option<Url>> {
        self.webhook_url
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(validate_webhook_url)
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileAccepted {
    pub message: String,
    pub event_id: EventId,
    pub status: CompilationStatus,
}

/// Start compiling an event in the background.
///
/// Answers 202 as soon as the job is running. The outcome is only visible
/// through `GET /status/{eventId}` or the webhook.
pub async fn trigger_compile(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<CompileAccepted>)> {
    state.shutdown.touch();

    let parsed = parse_event_id(event_id).and_then(|id| {
        let request = CompileRequest::from_body(&body)?;
        Ok((id, request.webhook()?))
    });
    let (event_id, webhook) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            record_compile_trigger("rejected");
            return Err(e);
        }
    };

    let lease = match state.orchestrator.reserve(&event_id) {
        Ok(lease) => lease,
        Err(e) => {
            warn!(event_id = %event_id, error = %e, "Compile trigger refused");
            record_compile_trigger("conflict");
            return Err(e.into());
        }
    };

    // Under the lease: a job is either refused here or counted by `drain`
    if state.shutdown.is_triggered() {
        drop(lease);
        record_compile_trigger("rejected");
        return Err(ApiError::Unavailable("Server is shutting down".to_string()));
    }

    let has_webhook = webhook.is_some();
    state.orchestrator.start_reserved(lease, webhook).await;

    record_compile_trigger("accepted");
    info!(event_id = %event_id, webhook = has_webhook, "Compilation triggered");

    Ok((
        StatusCode::ACCEPTED,
        Json(CompileAccepted {
            message: format!("Compilation started for event {}", event_id),
            event_id,
            status: CompilationStatus::Processing,
        }),
    ))
}

/// Current compilation status. Unknown events read `pending`.
pub async fn get_status(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<CompilationJob>> {
    let event_id = parse_event_id(event_id)?;
    Ok(Json(state.orchestrator.status(&event_id).await))
}
