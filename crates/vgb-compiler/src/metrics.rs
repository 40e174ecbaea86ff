//! Compilation metrics.

use metrics::{counter, gauge, histogram};

/// Metric name constants.
pub mod names {
    pub const COMPILATIONS_STARTED: &str = "vgb_compilations_started_total";
    pub const COMPILATIONS_FINISHED: &str = "vgb_compilations_finished_total";
    pub const COMPILATIONS_ACTIVE: &str = "vgb_compilations_active";
    pub const PHASE_DURATION: &str = "vgb_compilation_phase_duration_seconds";
    pub const WEBHOOK_DELIVERIES: &str = "vgb_webhook_deliveries_total";
}

pub fn record_started() {
    counter!(names::COMPILATIONS_STARTED).increment(1);
    gauge!(names::COMPILATIONS_ACTIVE).increment(1.0);
}

/// `outcome` is "completed" or "failed".
pub fn record_finished(outcome: &'static str) {
    counter!(names::COMPILATIONS_FINISHED, "outcome" => outcome).increment(1);
    gauge!(names::COMPILATIONS_ACTIVE).decrement(1.0);
}

pub fn record_phase(phase: &'static str, seconds: f64) {
    histogram!(names::PHASE_DURATION, "phase" => phase).record(seconds);
}

pub fn record_webhook(outcome: &'static str) {
    counter!(names::WEBHOOK_DELIVERIES, "outcome" => outcome).increment(1);
}
