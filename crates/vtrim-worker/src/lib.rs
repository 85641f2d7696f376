//! Trim job worker.
//!
//! This crate provides:
//! - A pool of executors draining the two-lane queue
//! - The acquire/transform/persist pipeline with progress checkpoints
//! - Scoped per-job workspaces
//! - The reaper for stale temporary files and expired artifacts
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reaper;
pub mod workspace;

pub use config::{BlobPrefix, ReaperConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::WorkerPool;
pub use fetcher::StoreFetcher;
pub use logging::JobLogger;
pub use pipeline::{JobReport, Pipeline};
pub use reaper::{Reaper, SweepReport};
pub use workspace::JobWorkspace;
