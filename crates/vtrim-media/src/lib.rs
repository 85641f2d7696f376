//! External media tooling for the trim pipeline.
//!
//! This crate provides:
//! - A process runner with timeouts, stderr capture and ffmpeg progress
//! - Type-safe FFmpeg and yt-dlp command building
//! - Source metadata probing
//! - The smart/fallback transform strategy over a [`MediaToolkit`]

pub mod command;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod process;
pub mod progress;
pub mod strategy;
pub mod toolkit;

pub use command::{check_ffmpeg, check_ytdlp, transcode_command, FfmpegCommand, ToolCommand, TranscodeSpec};
pub use download::{download_segment, download_video, YtDlpOptions};
pub use error::{MediaError, MediaResult};
pub use probe::probe_source;
pub use process::{ProcessOutput, ProcessRunner, DEFAULT_PROCESS_TIMEOUT};
pub use progress::{no_progress, FfmpegProgress, FractionCallback};
pub use strategy::{
    TransformOutcome, TransformPath, TransformRequest, TransformStrategy,
    DEFAULT_FALLBACK_CEILING_SECS,
};
pub use toolkit::{BlobFetcher, CliToolkit, MediaToolkit, SourceInput};
