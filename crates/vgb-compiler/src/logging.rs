//! Structured job logging utilities.

use std::time::Instant;

use tracing::{error, info, warn, Span};
use vgb_models::EventId;

/// Job logger for structured logging with consistent fields.
///
/// Every line carries the event id, the operation and the time elapsed since
/// the logger was created.
#[derive(Debug, Clone)]
pub struct JobLogger {
    event_id: String,
    operation: String,
    started: Instant,
}

impl JobLogger {
    pub fn new(event_id: &EventId, operation: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            operation: operation.to_string(),
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn log_start(&self, message: &str) {
        info!(
            event_id = %self.event_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, progress: u8, message: &str) {
        info!(
            event_id = %self.event_id,
            operation = %self.operation,
            progress,
            elapsed_ms = self.elapsed_ms(),
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            event_id = %self.event_id,
            operation = %self.operation,
            elapsed_ms = self.elapsed_ms(),
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            event_id = %self.event_id,
            operation = %self.operation,
            elapsed_ms = self.elapsed_ms(),
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            event_id = %self.event_id,
            operation = %self.operation,
            elapsed_ms = self.elapsed_ms(),
            "Job completed: {}", message
        );
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span for the whole job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "compile",
            event_id = %self.event_id,
            operation = %self.operation
        )
    }
}
