//! Submission boundary: raw client request to validated job descriptor.
//!
//! A [`JobDescriptor`] can only be obtained through
//! [`SubmitRequest::into_descriptor`], so everything the queue accepts has
//! passed the range, duration and format checks below.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::encoding::{Container, Resolution};
use crate::job::{Job, JobId, JobPayload, OwnerConnection, Priority, SourceRef, TrimRange};
use crate::timestamp::TimeValue;

/// Default express lane threshold (5 minutes).
pub const DEFAULT_EXPRESS_THRESHOLD_SECS: f64 = 300.0;
/// Default absolute maximum clip length (1 hour).
pub const DEFAULT_MAX_CLIP_SECS: f64 = 3600.0;
/// Slack allowed past a probed source duration; probes round.
pub const SOURCE_DURATION_TOLERANCE_SECS: f64 = 1.0;

/// Longest accepted source URL.
const MAX_URL_LEN: usize = 2048;

/// Why a submission was rejected. Never produces a queue entry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("start must be >= 0 (got {0})")]
    NegativeStart(f64),

    #[error("trim bounds must be finite numbers")]
    NonFinite,

    #[error("end ({end}) must be greater than start ({start})")]
    InvalidRange { start: f64, end: f64 },

    #[error("requested duration {requested:.1}s exceeds the maximum of {max:.0}s")]
    TooLong { requested: f64, max: f64 },

    #[error("range end {end:.1}s exceeds source duration {duration:.1}s")]
    OutOfSource { end: f64, duration: f64 },

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),

    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("invalid format id: {0}")]
    InvalidFormatId(String),

    #[error("invalid {field}: {message}")]
    InvalidField { field: String, message: String },
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("request".to_string(), "is invalid".to_string()));
        ValidationError::InvalidField { field, message }
    }
}

/// Limits applied at submission time.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionLimits {
    /// Duration at or below which a job is express.
    pub express_threshold_secs: f64,
    /// Absolute maximum clip length.
    pub max_clip_secs: f64,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            express_threshold_secs: DEFAULT_EXPRESS_THRESHOLD_SECS,
            max_clip_secs: DEFAULT_MAX_CLIP_SECS,
        }
    }
}

impl SubmissionLimits {
    /// Load limits from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            express_threshold_secs: std::env::var("EXPRESS_THRESHOLD_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.express_threshold_secs),
            max_clip_secs: std::env::var("MAX_CLIP_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_clip_secs),
        }
    }
}

fn default_format_id() -> String {
    "best".to_string()
}

/// Raw submission from a client.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub source: SourceRef,

    #[serde(default = "default_format_id")]
    #[validate(length(min = 1, max = 128, message = "must be 1-128 characters"))]
    pub format_id: String,

    pub start: TimeValue,

    pub end: TimeValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 16))]
    pub container: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 16))]
    pub resolution: Option<String>,
}

impl SubmitRequest {
    /// Requested range, parsed but not yet checked against limits.
    pub fn range(&self) -> Result<TrimRange, ValidationError> {
        let start = self
            .start
            .to_seconds()
            .map_err(|e| field_error("start", e))?;
        let end = self.end.to_seconds().map_err(|e| field_error("end", e))?;
        TrimRange::new(start, end)
    }

    /// Validate everything and produce a descriptor ready for enqueue.
    ///
    /// `source_duration` is checked when known (probed URL sources).
    pub fn into_descriptor(
        self,
        owner: OwnerConnection,
        limits: &SubmissionLimits,
        source_duration: Option<f64>,
    ) -> Result<JobDescriptor, ValidationError> {
        self.validate()?;

        let range = self.range()?;
        if range.duration() > limits.max_clip_secs {
            return Err(ValidationError::TooLong {
                requested: range.duration(),
                max: limits.max_clip_secs,
            });
        }
        if let Some(duration) = source_duration.filter(|d| d.is_finite() && *d > 0.0) {
            if range.end() > duration + SOURCE_DURATION_TOLERANCE_SECS {
                return Err(ValidationError::OutOfSource {
                    end: range.end(),
                    duration,
                });
            }
        }

        validate_source(&self.source)?;
        validate_format_id(&self.format_id)?;

        let container = match self.container.as_deref() {
            None => Container::default(),
            Some(c) => c
                .parse()
                .map_err(ValidationError::UnsupportedContainer)?,
        };
        let resolution = self
            .resolution
            .as_deref()
            .map(|r| r.parse::<Resolution>())
            .transpose()
            .map_err(ValidationError::InvalidResolution)?;

        Ok(JobDescriptor {
            priority: Priority::classify(range.duration(), limits.express_threshold_secs),
            payload: JobPayload {
                source: self.source,
                format_id: self.format_id,
                range,
                container,
                resolution,
            },
            owner,
        })
    }
}

fn field_error(field: &str, err: impl std::fmt::Display) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        message: err.to_string(),
    }
}

fn validate_source(source: &SourceRef) -> Result<(), ValidationError> {
    match source {
        SourceRef::Url { url } => {
            if url.len() > MAX_URL_LEN {
                return Err(ValidationError::InvalidSource("url is too long".into()));
            }
            let parsed = url::Url::parse(url)
                .map_err(|e| ValidationError::InvalidSource(format!("bad url: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ValidationError::InvalidSource(
                    "url must be http or https".into(),
                ));
            }
            if parsed.host_str().is_none() {
                return Err(ValidationError::InvalidSource("url has no host".into()));
            }
            Ok(())
        }
        SourceRef::Blob { key } => {
            let safe = key.starts_with("uploads/")
                && !key.contains("..")
                && !key.contains("//")
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
            if safe {
                Ok(())
            } else {
                Err(ValidationError::InvalidSource(
                    "blob key must be an uploads/ key".into(),
                ))
            }
        }
    }
}

/// yt-dlp format selectors: `best`, `137+140`, `bv*[height<=720]+ba/b`.
fn validate_format_id(format_id: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| {
        c.is_ascii_alphanumeric()
            || matches!(c, '+' | '/' | '-' | '_' | '.' | '*' | '[' | ']' | '<' | '>' | '=' | '!' | '?')
    };
    if format_id.starts_with('-') || !format_id.chars().all(allowed) {
        return Err(ValidationError::InvalidFormatId(format_id.to_string()));
    }
    Ok(())
}

/// Validated job description, ready to enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    priority: Priority,
    payload: JobPayload,
    owner: OwnerConnection,
}

impl JobDescriptor {
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    pub fn owner(&self) -> &OwnerConnection {
        &self.owner
    }

    /// Assign an id and turn the descriptor into a queued job.
    pub fn into_job(self) -> Job {
        Job {
            id: JobId::new(),
            priority: self.priority,
            payload: self.payload,
            owner: self.owner,
            enqueued_at: Utc::now(),
        }
    }
}

/// Response to an accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub priority: Priority,
}
