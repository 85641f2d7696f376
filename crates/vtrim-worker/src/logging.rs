//! Structured job logging utilities.
//!
//! Every line carries the job id, lane and operation so a single job can be
//! followed through the logs of a busy worker.

use tracing::{error, info, warn, Span};
use vtrim_models::{Job, JobId, Priority};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    priority: &'static str,
    operation: String,
}

impl JobLogger {
    /// Create a logger for a dequeued job.
    pub fn new(job: &Job, operation: &str) -> Self {
        Self::with_priority(&job.id, job.priority, operation)
    }

    pub fn with_priority(job_id: &JobId, priority: Priority, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            priority: priority.as_str(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            priority = self.priority,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: &str, message: &str) {
        info!(
            job_id = %self.job_id,
            priority = self.priority,
            operation = %self.operation,
            stage,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            priority = self.priority,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            priority = self.priority,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            priority = self.priority,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping one job execution.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            priority = self.priority,
            operation = %self.operation
        )
    }
}
