//! Job status snapshot for polling.
//!
//! Every lifecycle event is folded into a short-lived snapshot so a client
//! that lost its socket can still find out what happened to a job.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::event::JobEvent;
use crate::failure::JobFailure;
use crate::job::{JobId, JobState, Priority};

/// Snapshot of a job as last reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSnapshot {
    pub job_id: JobId,
    /// Owner allowed to read this snapshot
    pub owner_id: String,
    pub priority: Priority,
    pub state: JobState,
    /// Progress percentage (0-100), never decreases
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusSnapshot {
    /// Snapshot for a freshly queued job.
    pub fn queued(job_id: JobId, owner_id: impl Into<String>, priority: Priority) -> Self {
        Self {
            job_id,
            owner_id: owner_id.into(),
            priority,
            state: JobState::Queued,
            progress: 0,
            result_ref: None,
            failure: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Fold an event into the snapshot.
    ///
    /// Events that would move the state backwards or lower progress are
    /// ignored; returns whether the snapshot changed.
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        if event.job_id() != &self.job_id {
            return false;
        }
        let changed = match event {
            JobEvent::Queued { .. } => false,
            JobEvent::Progress { pct, .. } => {
                if self.state.is_terminal() {
                    false
                } else {
                    let activated = self.state == JobState::Queued;
                    self.state = JobState::Active;
                    let advanced = *pct > self.progress;
                    if advanced {
                        self.progress = (*pct).min(100);
                    }
                    activated || advanced
                }
            }
            JobEvent::Completed { result_ref, .. } => {
                if self.state.is_terminal() {
                    false
                } else {
                    self.state = JobState::Completed;
                    self.progress = 100;
                    self.result_ref = Some(result_ref.clone());
                    true
                }
            }
            JobEvent::Failed { reason, message, .. } => {
                if self.state.is_terminal() {
                    false
                } else {
                    self.state = JobState::Failed;
                    self.failure = Some(JobFailure {
                        kind: *reason,
                        message: message.clone(),
                    });
                    true
                }
            }
        };
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureKind;

    fn snapshot() -> JobStatusSnapshot {
        JobStatusSnapshot::queued(JobId::from_string("job-1"), "user-1", Priority::Express)
    }

    #[test]
    fn test_snapshot_progression() {
        let mut s = snapshot();
        assert_eq!(s.state, JobState::Queued);

        assert!(s.apply(&JobEvent::progress(s.job_id.clone(), 10)));
        assert_eq!(s.state, JobState::Active);
        assert!(s.apply(&JobEvent::progress(s.job_id.clone(), 55)));
        assert!(!s.apply(&JobEvent::progress(s.job_id.clone(), 30)));
        assert_eq!(s.progress, 55);

        assert!(s.apply(&JobEvent::completed(s.job_id.clone(), "processed/job-1.mp4", None)));
        assert_eq!(s.state, JobState::Completed);
        assert_eq!(s.progress, 100);
        assert!(s.is_terminal());
    }

    #[test]
    fn test_terminal_is_sticky() {
        let mut s = snapshot();
        let failure = JobFailure::new(FailureKind::TranscodeFailed, "ffmpeg failed");
        assert!(s.apply(&JobEvent::failed(s.job_id.clone(), failure)));
        assert!(!s.apply(&JobEvent::completed(s.job_id.clone(), "k", None)));
        assert!(!s.apply(&JobEvent::progress(s.job_id.clone(), 90)));
        assert_eq!(s.state, JobState::Failed);
        assert_eq!(s.failure.as_ref().unwrap().kind, FailureKind::TranscodeFailed);
    }

    #[test]
    fn test_other_job_ignored() {
        let mut s = snapshot();
        assert!(!s.apply(&JobEvent::progress(JobId::from_string("other"), 50)));
        assert_eq!(s.progress, 0);
    }
}
