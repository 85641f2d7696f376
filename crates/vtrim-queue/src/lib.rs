//! Two-lane job queue and progress delivery.
//!
//! This crate provides:
//! - Express/standard job lanes on Redis lists (or in memory)
//! - Per-connection lifecycle events via Redis Pub/Sub (or in memory)
//! - Job status snapshots for polling
//! - The submission service that ties them together

pub mod error;
pub mod progress;
pub mod publisher;
pub mod queue;
pub mod status;
pub mod submission;

pub use error::{QueueError, QueueResult};
pub use progress::{Delivery, EventStream, MemoryNotifier, Notifier, ProgressChannel};
pub use publisher::EventPublisher;
pub use queue::{JobQueue, MemoryJobQueue, QueueConfig, RedisJobQueue};
pub use status::{MemoryStatusStore, RedisStatusStore, StatusStore, JOB_STATUS_TTL_SECS};
pub use submission::SubmissionService;
