//! Compilation job status for progress tracking and polling.
//!
//! A `CompilationJob` is a snapshot of one event's compilation as seen by
//! polling clients. It only lives in process memory.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::EventId;

/// Highest progress value a running job may report. 100 is reserved for success.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Compilation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompilationStatus {
    /// Never submitted (implicit default)
    #[default]
    Pending,
    /// Compilation in flight
    Processing,
    /// Output published
    Completed,
    /// Compilation aborted with an error
    Failed,
}

impl CompilationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilationStatus::Pending => "pending",
            CompilationStatus::Processing => "processing",
            CompilationStatus::Completed => "completed",
            CompilationStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompilationStatus::Completed | CompilationStatus::Failed)
    }
}

impl std::fmt::Display for CompilationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one event's compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompilationJob {
    pub event_id: EventId,
    pub status: CompilationStatus,
    /// Progress percentage (0-100). Absent while pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Storage key of the published output, set only when completed.
    /// Internal; clients get `outputUrl`.
    #[serde(default, skip_serializing)]
    pub output_key: Option<String>,
    /// Access URL of the published output, set only when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    /// Error message, set only when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CompilationJob {
    /// Status of an event that was never submitted.
    pub fn pending(event_id: EventId) -> Self {
        Self {
            event_id,
            status: CompilationStatus::Pending,
            progress: None,
            output_key: None,
            output_url: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Fresh `processing` entry at 0%.
    pub fn processing(event_id: EventId) -> Self {
        Self {
            status: CompilationStatus::Processing,
            progress: Some(0),
            started_at: Some(Utc::now()),
            ..Self::pending(event_id)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Raise progress. Never lowers it and never reaches 100 while running.
    ///
    /// Returns `true` if the stored value changed.
    pub fn set_progress(&mut self, progress: u8) -> bool {
        if self.status != CompilationStatus::Processing {
            return false;
        }
        let next = progress.min(MAX_RUNNING_PROGRESS);
        let current = self.progress.unwrap_or(0);
        if next > current || self.progress.is_none() {
            self.progress = Some(next.max(current));
            return true;
        }
        false
    }

    /// Mark the job as completed with its published output.
    pub fn complete(&mut self, output_key: impl Into<String>, output_url: impl Into<String>) {
        self.status = CompilationStatus::Completed;
        self.progress = Some(100);
        self.output_key = Some(output_key.into());
        self.output_url = Some(output_url.into());
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the job as failed. Progress stays where it stopped.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = CompilationStatus::Failed;
        self.progress = Some(self.progress.unwrap_or(0).min(MAX_RUNNING_PROGRESS));
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}
