//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Serve `/metrics` on `0.0.0.0:port`.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "vtrim_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vtrim_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vtrim_jobs_failed_total";
    pub const JOBS_ACTIVE: &str = "vtrim_jobs_active";
    pub const QUEUE_WAIT_SECONDS: &str = "vtrim_queue_wait_seconds";
    pub const JOB_DURATION_SECONDS: &str = "vtrim_job_duration_seconds";
    pub const STAGE_DURATION_SECONDS: &str = "vtrim_stage_duration_seconds";
    pub const TRANSFORM_PATH_TOTAL: &str = "vtrim_transform_path_total";
    pub const REAPER_SCANNED_TOTAL: &str = "vtrim_reaper_scanned_total";
    pub const REAPER_DELETED_TOTAL: &str = "vtrim_reaper_deleted_total";
    pub const REAPER_FAILED_TOTAL: &str = "vtrim_reaper_failed_total";
}

pub fn record_job_started(priority: &str, queue_wait_secs: f64) {
    let labels = [("priority", priority.to_string())];
    counter!(names::JOBS_STARTED_TOTAL, &labels).increment(1);
    histogram!(names::QUEUE_WAIT_SECONDS, &labels).record(queue_wait_secs);
    gauge!(names::JOBS_ACTIVE).increment(1.0);
}

pub fn record_job_completed(priority: &str, path: &str, duration_secs: f64) {
    let labels = [("priority", priority.to_string()), ("path", path.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
    gauge!(names::JOBS_ACTIVE).decrement(1.0);
}

pub fn record_job_failed(priority: &str, reason: &str) {
    let labels = [("priority", priority.to_string()), ("reason", reason.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
    gauge!(names::JOBS_ACTIVE).decrement(1.0);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_transform_path(path: &str) {
    let labels = [("path", path.to_string())];
    counter!(names::TRANSFORM_PATH_TOTAL, &labels).increment(1);
}

pub fn record_sweep(location: &str, scanned: usize, deleted: usize, failed: usize) {
    let labels = [("location", location.to_string())];
    counter!(names::REAPER_SCANNED_TOTAL, &labels).increment(scanned as u64);
    counter!(names::REAPER_DELETED_TOTAL, &labels).increment(deleted as u64);
    counter!(names::REAPER_FAILED_TOTAL, &labels).increment(failed as u64);
}
