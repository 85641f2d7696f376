//! Shared data models for the vtrim job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, priorities and the job state machine
//! - Submission validation
//! - Encoding configuration
//! - Lifecycle events, failures and status snapshots
//! - WebSocket message schemas

pub mod encoding;
pub mod event;
pub mod failure;
pub mod job;
pub mod job_status;
pub mod submission;
pub mod timestamp;
pub mod video;
pub mod ws;

// Re-export common types
pub use encoding::{Container, EncodingConfig, Resolution};
pub use event::JobEvent;
pub use failure::{FailureKind, JobFailure};
pub use job::{
    InvalidTransition, Job, JobId, JobPayload, JobState, OwnerConnection, Priority, SourceRef,
    TrimRange,
};
pub use job_status::JobStatusSnapshot;
pub use submission::{
    JobDescriptor, SubmissionLimits, SubmitRequest, SubmitResponse, ValidationError,
};
pub use timestamp::{TimeValue, TimestampError};
pub use video::{FormatInfo, SourceInfo};
pub use ws::{WsClientMessage, WsServerMessage};
