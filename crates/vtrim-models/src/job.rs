//! Job definitions for queue processing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::encoding::{Container, Resolution};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this looks like an id we issued. Used to reject path
    /// parameters before they reach storage keys or broker keys.
    pub fn is_well_formed(&self) -> bool {
        Uuid::parse_str(&self.0).is_ok()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue lane a job is placed in.
///
/// Assigned once at submission from the requested trim duration and
/// never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Short clips, drained first.
    Express,
    /// Everything else.
    Standard,
}

impl Priority {
    /// Lanes in drain order.
    pub const ALL: [Priority; 2] = [Priority::Express, Priority::Standard];

    /// Duration at or below the threshold goes to the express lane.
    pub fn classify(duration_secs: f64, express_threshold_secs: f64) -> Self {
        if duration_secs <= express_threshold_secs {
            Priority::Express
        } else {
            Priority::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Express => "express",
            Priority::Standard => "standard",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in a queue lane
    #[default]
    Queued,
    /// Job is owned by an executor
    Active,
    /// Job finished and the result is stored
    Completed,
    /// Job failed; never retried
    Failed,
}

/// Attempted a transition the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Move forward in the lifecycle.
    ///
    /// Only `Queued -> Active` and `Active -> Completed | Failed` are legal.
    pub fn transition(self, to: JobState) -> Result<JobState, InvalidTransition> {
        match (self, to) {
            (JobState::Queued, JobState::Active)
            | (JobState::Active, JobState::Completed)
            | (JobState::Active, JobState::Failed) => Ok(to),
            _ => Err(InvalidTransition { from: self, to }),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the input media comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    /// Remote page or media URL resolved by yt-dlp.
    Url { url: String },
    /// Object previously uploaded to the blob store.
    Blob { key: String },
}

impl SourceRef {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceRef::Url { .. } => "url",
            SourceRef::Blob { .. } => "blob",
        }
    }
}

/// Requested cut, in seconds. Always `0 <= start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrimRange {
    start: f64,
    end: f64,
}

impl TrimRange {
    /// Build a range, rejecting negative, non-finite or empty bounds.
    pub fn new(start: f64, end: f64) -> Result<Self, crate::ValidationError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(crate::ValidationError::NonFinite);
        }
        if start < 0.0 {
            return Err(crate::ValidationError::NegativeStart(start));
        }
        if end <= start {
            return Err(crate::ValidationError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Validated work description carried by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub source: SourceRef,
    /// yt-dlp format selector for URL sources.
    pub format_id: String,
    pub range: TrimRange,
    pub container: Container,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub resolution: Option<Resolution>,
}

/// Client channel that receives lifecycle events for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerConnection {
    /// Authenticated owner id supplied by the upstream auth layer.
    pub owner_id: String,
    /// Socket connection the job was submitted from.
    pub connection_id: String,
}

impl OwnerConnection {
    pub fn new(owner_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            connection_id: connection_id.into(),
        }
    }
}

/// A job handed out by the queue.
///
/// Built only from a [`crate::JobDescriptor`], so the payload has always been
/// validated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Lane, fixed at submission
    pub priority: Priority,

    pub payload: JobPayload,

    pub owner: OwnerConnection,

    /// Enqueue timestamp
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Blob key the finished artifact is stored under.
    pub fn result_key(&self) -> String {
        format!(
            "processed/{}.{}",
            self.id,
            self.payload.container.extension()
        )
    }
}
