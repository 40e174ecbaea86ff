//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vgb_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vgb_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vgb_http_requests_in_flight";

    pub const COMPILE_TRIGGERS_TOTAL: &str = "vgb_compile_triggers_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "vgb_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a compile trigger by outcome (`accepted`, `conflict`, `rejected`).
pub fn record_compile_trigger(outcome: &'static str) {
    counter!(names::COMPILE_TRIGGERS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Replace event ids in paths so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    static EVENT_PATH: OnceLock<Regex> = OnceLock::new();
    let re = EVENT_PATH.get_or_init(|| {
        Regex::new(r"^/(compile|status|output)/[^/]+").expect("valid event path regex")
    });
    re.replace(path, "/$1/:event_id").into_owned()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/compile/evt-42"), "/compile/:event_id");
        assert_eq!(sanitize_path("/status/AbC_123"), "/status/:event_id");
        assert_eq!(sanitize_path("/output/e1"), "/output/:event_id");
        assert_eq!(sanitize_path("/health"), "/health");
        assert_eq!(sanitize_path("/metrics"), "/metrics");
    }
}
