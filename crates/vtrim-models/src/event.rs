//! Job lifecycle events delivered to the submitting connection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::failure::{FailureKind, JobFailure};
use crate::job::{JobId, Priority};

/// Lifecycle event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Job accepted and placed in a lane
    Queued {
        #[serde(rename = "jobId")]
        job_id: JobId,
        priority: Priority,
    },

    /// Progress update (0-100)
    Progress {
        #[serde(rename = "jobId")]
        job_id: JobId,
        pct: u8,
    },

    /// Result stored
    Completed {
        #[serde(rename = "jobId")]
        job_id: JobId,
        /// Blob key of the artifact
        #[serde(rename = "resultRef")]
        result_ref: String,
        /// Short-lived retrieval URL
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    /// Job failed; no retry follows
    Failed {
        #[serde(rename = "jobId")]
        job_id: JobId,
        reason: FailureKind,
        message: String,
    },
}

impl JobEvent {
    pub fn queued(job_id: JobId, priority: Priority) -> Self {
        JobEvent::Queued { job_id, priority }
    }

    pub fn progress(job_id: JobId, pct: u8) -> Self {
        JobEvent::Progress {
            job_id,
            pct: pct.min(100),
        }
    }

    pub fn completed(job_id: JobId, result_ref: impl Into<String>, url: Option<String>) -> Self {
        JobEvent::Completed {
            job_id,
            result_ref: result_ref.into(),
            url,
        }
    }

    pub fn failed(job_id: JobId, failure: JobFailure) -> Self {
        JobEvent::Failed {
            job_id,
            reason: failure.kind,
            message: failure.message,
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Queued { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self {
            JobEvent::Queued { .. } => "queued",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let id = JobId::from_string("j1");
        let json = serde_json::to_value(JobEvent::queued(id.clone(), Priority::Express)).unwrap();
        assert_eq!(json["type"], "queued");
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["priority"], "express");

        let json = serde_json::to_value(JobEvent::completed(id.clone(), "processed/j1.mp4", None)).unwrap();
        assert_eq!(json["resultRef"], "processed/j1.mp4");
        assert!(json.get("url").is_none());

        let failure = JobFailure::new(FailureKind::DurationTooLong, "too long");
        let json = serde_json::to_value(JobEvent::failed(id, failure)).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["reason"], "duration_too_long");
    }

    #[test]
    fn test_progress_clamped() {
        match JobEvent::progress(JobId::from_string("j"), 150) {
            JobEvent::Progress { pct, .. } => assert_eq!(pct, 100),
            _ => unreachable!(),
        }
    }
}
