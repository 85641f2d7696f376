//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;
use vtrim_models::FailureKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),

    #[error("{tool} failed: {message}")]
    ProcessFailed {
        tool: &'static str,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: &'static str, secs: u64 },

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Unsupported format: {0}")]
    FormatUnsupported(String),

    #[error("Requested duration {requested:.0}s exceeds the {ceiling:.0}s limit for local processing")]
    DurationTooLong { requested: f64, ceiling: f64 },

    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    #[error("Output missing or empty: {0}")]
    OutputMissing(PathBuf),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// stderr fragments that mean the source exists but cannot be served in
/// the requested shape.
const FORMAT_MARKERS: &[&str] = &[
    "Requested format is not available",
    "Unsupported URL",
    "does not support",
    "Invalid data found when processing input",
    "codec not currently supported in container",
    "Could not find tag for codec",
];

impl MediaError {
    /// Create a process failure error.
    pub fn process_failed(
        tool: &'static str,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ProcessFailed {
            tool,
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Captured stderr tail, if the error came from a subprocess.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ProcessFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }

    /// Reclassify a raw process failure raised while acquiring the source.
    pub fn during_acquisition(self) -> Self {
        match self {
            Self::ProcessFailed {
                message, stderr, ..
            } => {
                let haystack = stderr.as_deref().unwrap_or(&message);
                if FORMAT_MARKERS.iter().any(|m| haystack.contains(m)) {
                    Self::FormatUnsupported(message)
                } else {
                    Self::SourceUnavailable(message)
                }
            }
            Self::Timeout { tool, secs } => {
                Self::SourceUnavailable(format!("{tool} timed out after {secs}s"))
            }
            Self::OutputMissing(path) => {
                Self::SourceUnavailable(format!("nothing downloaded to {}", path.display()))
            }
            other => other,
        }
    }

    /// Reclassify a raw process failure raised by the local transcode.
    pub fn during_transcode(self) -> Self {
        match self {
            Self::ProcessFailed { message, .. } => Self::TranscodeFailed(message),
            Self::Timeout { tool, secs } => {
                Self::TranscodeFailed(format!("{tool} timed out after {secs}s"))
            }
            other => other,
        }
    }

    /// Map onto the pipeline failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SourceUnavailable(_) => FailureKind::SourceUnavailable,
            Self::FormatUnsupported(_) => FailureKind::FormatUnsupported,
            Self::DurationTooLong { .. } => FailureKind::DurationTooLong,
            Self::ProcessFailed { .. }
            | Self::Timeout { .. }
            | Self::TranscodeFailed(_)
            | Self::OutputMissing(_) => FailureKind::TranscodeFailed,
            Self::Storage(_) => FailureKind::StorageFailure,
            Self::ToolNotFound(_) | Self::Io(_) | Self::JsonParse(_) | Self::Internal(_) => {
                FailureKind::InternalFault
            }
        }
    }

    /// Short client-facing message; no stderr.
    pub fn client_message(&self) -> String {
        match self {
            Self::ProcessFailed { tool, exit_code, .. } => match exit_code {
                Some(code) => format!("{tool} exited with status {code}"),
                None => format!("{tool} was terminated"),
            },
            Self::Io(_) | Self::JsonParse(_) | Self::Internal(_) | Self::ToolNotFound(_) => {
                self.kind().default_message().to_string()
            }
            other => other.to_string(),
        }
    }
}
