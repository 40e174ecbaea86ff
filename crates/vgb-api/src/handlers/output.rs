//! Compiled output access and removal.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use vgb_models::EventId;

use crate::error::ApiResult;
use crate::handlers::parse_event_id;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResponse {
    pub event_id: EventId,
    pub output_url: String,
}

/// Fresh signed URL for the event's compiled video.
pub async fn get_output(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<OutputResponse>> {
    let event_id = parse_event_id(event_id)?;
    let output_url = state.orchestrator.output_url(&event_id).await?;
    Ok(Json(OutputResponse {
        event_id,
        output_url,
    }))
}

/// Delete the compiled video so the event can be compiled again.
pub async fn delete_output(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<StatusCode> {
    let event_id = parse_event_id(event_id)?;
    state.orchestrator.remove_output(&event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
