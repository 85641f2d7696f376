//! Failure taxonomy shared by every stage of the pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of why a job (or a submission) did not succeed.
///
/// Clients only ever see this category plus a short message; error chains
/// and tool stderr stay in server logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected at submission
    Validation,
    /// Source could not be fetched or resolved
    SourceUnavailable,
    /// Source or requested format cannot be handled
    FormatUnsupported,
    /// Requested range exceeds what the fallback path accepts
    DurationTooLong,
    /// Local transcode failed or timed out
    TranscodeFailed,
    /// Blob store read/write failed
    StorageFailure,
    /// Anything else
    InternalFault,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::SourceUnavailable => "source_unavailable",
            FailureKind::FormatUnsupported => "format_unsupported",
            FailureKind::DurationTooLong => "duration_too_long",
            FailureKind::TranscodeFailed => "transcode_failed",
            FailureKind::StorageFailure => "storage_failure",
            FailureKind::InternalFault => "internal_fault",
        }
    }

    /// Message shown to clients when no more specific one applies.
    pub fn default_message(&self) -> &'static str {
        match self {
            FailureKind::Validation => "Request failed validation",
            FailureKind::SourceUnavailable => "Source video could not be retrieved",
            FailureKind::FormatUnsupported => "Source format is not supported",
            FailureKind::DurationTooLong => "Requested clip is too long to process",
            FailureKind::TranscodeFailed => "Video processing failed",
            FailureKind::StorageFailure => "Result could not be stored",
            FailureKind::InternalFault => "Internal error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Longest message forwarded to clients.
pub const MAX_CLIENT_MESSAGE_LEN: usize = 200;

impl JobFailure {
    /// Build a failure with a client-safe message: first line only, bounded.
    pub fn new(kind: FailureKind, message: impl AsRef<str>) -> Self {
        let first_line = message.as_ref().lines().next().unwrap_or("").trim();
        let message = if first_line.is_empty() {
            kind.default_message().to_string()
        } else {
            first_line.chars().take(MAX_CLIENT_MESSAGE_LEN).collect()
        };
        Self { kind, message }
    }
}

impl From<FailureKind> for JobFailure {
    fn from(kind: FailureKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
