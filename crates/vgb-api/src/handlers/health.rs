//! Liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// The process is up.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub ready: bool,
    pub ffmpeg_available: bool,
    pub shutting_down: bool,
    pub active_compilations: usize,
    /// Why the server refuses new work, empty when ready.
    pub reasons: Vec<&'static str>,
}

impl ReadinessResponse {
    fn for_state(state: &AppState) -> Self {
        let shutting_down = state.shutdown.is_triggered();
        let mut reasons = Vec::new();
        if !state.ffmpeg_ready {
            reasons.push("ffmpeg not found on PATH");
        }
        if shutting_down {
            reasons.push("shutting down");
        }

        Self {
            ready: reasons.is_empty(),
            ffmpeg_available: state.ffmpeg_ready,
            shutting_down,
            active_compilations: state.shutdown.active(),
            reasons,
        }
    }
}

/// 503 while FFmpeg is missing or once shutdown has begun.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let response = ReadinessResponse::for_state(&state);
    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
