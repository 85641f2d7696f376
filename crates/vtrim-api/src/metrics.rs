//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vtrim_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vtrim_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vtrim_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "vtrim_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "vtrim_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "vtrim_ws_messages_sent_total";
    pub const WS_MESSAGES_RECEIVED: &str = "vtrim_ws_messages_received_total";

    // Submission metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "vtrim_jobs_submitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "vtrim_jobs_rejected_total";
    pub const QUEUE_LENGTH: &str = "vtrim_queue_length";
    pub const UPLOADS_INITIALIZED_TOTAL: &str = "vtrim_uploads_initialized_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "vtrim_rate_limit_hits_total";
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

pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

pub fn ws_connection_opened() {
    gauge!(names::WS_CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn ws_connection_closed() {
    gauge!(names::WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn record_ws_message_sent(message_type: &str) {
    let labels = [("type", message_type.to_string())];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

pub fn record_ws_message_received() {
    counter!(names::WS_MESSAGES_RECEIVED).increment(1);
}

/// Record an accepted submission.
pub fn record_job_submitted(priority: &str) {
    let labels = [("priority", priority.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// Record a submission rejected before enqueue.
pub fn record_job_rejected(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_REJECTED_TOTAL, &labels).increment(1);
}

/// Update a lane depth gauge.
pub fn set_queue_length(lane: &str, length: u64) {
    let labels = [("lane", lane.to_string())];
    gauge!(names::QUEUE_LENGTH, &labels).set(length as f64);
}

pub fn record_upload_initialized(content_type: &str) {
    let labels = [("content_type", content_type.to_string())];
    counter!(names::UPLOADS_INITIALIZED_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse ids in a path so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut previous = "";
    for segment in path.split('/') {
        let replaced = match previous {
            "jobs" if !segment.is_empty() => ":job_id",
            _ => segment,
        };
        out.push(replaced);
        previous = segment;
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
