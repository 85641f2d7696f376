//! Media operations used by the transform strategy.
//!
//! [`MediaToolkit`] is the seam between the strategy's decision logic and
//! the processes it runs. [`CliToolkit`] drives ffmpeg and yt-dlp; tests
//! substitute a scripted implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use vtrim_models::{Container, TrimRange};

use crate::command::{remux_command, seek_copy_command, transcode_command, TranscodeSpec};
use crate::download::{download_segment, download_video, YtDlpOptions};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_nonempty, remove_if_exists};
use crate::process::ProcessRunner;
use crate::progress::FractionCallback;

/// Source as the media layer sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceInput {
    /// Page or media URL handled by yt-dlp
    Remote { url: String, format_id: String },
    /// Stored object, readable through a short-lived signed URL
    Blob { key: String, signed_url: String },
}

/// Fetches stored objects to local disk for the fallback path.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, key: &str, dest: &Path) -> MediaResult<()>;
}

/// The three operations the transform strategy composes.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Extract `range` from the remote source into `output` without
    /// re-encoding.
    async fn smart_trim(
        &self,
        source: &SourceInput,
        range: TrimRange,
        container: Container,
        work_dir: &Path,
        output: &Path,
    ) -> MediaResult<()>;

    /// Fetch the whole source into `work_dir`; returns the local path.
    async fn download_full(&self, source: &SourceInput, work_dir: &Path) -> MediaResult<PathBuf>;

    /// Cut and re-encode a local file.
    async fn transcode(&self, spec: &TranscodeSpec, on_progress: FractionCallback) -> MediaResult<()>;
}

#[async_trait]
impl<T: MediaToolkit + ?Sized> MediaToolkit for Arc<T> {
    async fn smart_trim(
        &self,
        source: &SourceInput,
        range: TrimRange,
        container: Container,
        work_dir: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        (**self).smart_trim(source, range, container, work_dir, output).await
    }

    async fn download_full(&self, source: &SourceInput, work_dir: &Path) -> MediaResult<PathBuf> {
        (**self).download_full(source, work_dir).await
    }

    async fn transcode(&self, spec: &TranscodeSpec, on_progress: FractionCallback) -> MediaResult<()> {
        (**self).transcode(spec, on_progress).await
    }
}

/// ffmpeg / yt-dlp backed toolkit.
#[derive(Clone)]
pub struct CliToolkit {
    runner: ProcessRunner,
    ytdlp: YtDlpOptions,
    blobs: Option<Arc<dyn BlobFetcher>>,
}

impl CliToolkit {
    pub fn new(runner: ProcessRunner, ytdlp: YtDlpOptions) -> Self {
        Self {
            runner,
            ytdlp,
            blobs: None,
        }
    }

    /// Enable blob sources on the fallback path.
    pub fn with_blob_fetcher(mut self, fetcher: Arc<dyn BlobFetcher>) -> Self {
        self.blobs = Some(fetcher);
        self
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }
}

#[async_trait]
impl MediaToolkit for CliToolkit {
    async fn smart_trim(
        &self,
        source: &SourceInput,
        range: TrimRange,
        container: Container,
        work_dir: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        match source {
            SourceInput::Remote { url, format_id } => {
                let segment = work_dir.join("segment.mkv");
                download_segment(&self.runner, url, format_id, range, &segment, &self.ytdlp).await?;

                let remuxed = self
                    .runner
                    .run(&remux_command(&segment, output, container).to_tool_command())
                    .await;
                // segment is only an intermediate
                if let Err(e) = remove_if_exists(&segment).await {
                    debug!("Failed to remove segment {}: {}", segment.display(), e);
                }
                remuxed.map_err(MediaError::during_transcode)?;
            }
            SourceInput::Blob { signed_url, .. } => {
                self.runner
                    .run(&seek_copy_command(signed_url, range, output, container).to_tool_command())
                    .await
                    .map_err(MediaError::during_acquisition)?;
            }
        }
        ensure_nonempty(output).await?;
        Ok(())
    }

    async fn download_full(&self, source: &SourceInput, work_dir: &Path) -> MediaResult<PathBuf> {
        let dest = work_dir.join("source.mkv");
        match source {
            SourceInput::Remote { url, format_id } => {
                download_video(&self.runner, url, format_id, &dest, &self.ytdlp).await?;
            }
            SourceInput::Blob { key, .. } => {
                let fetcher = self
                    .blobs
                    .as_ref()
                    .ok_or_else(|| MediaError::internal("no blob fetcher configured"))?;
                fetcher.fetch(key, &dest).await?;
                ensure_nonempty(&dest)
                    .await
                    .map_err(MediaError::during_acquisition)?;
            }
        }
        Ok(dest)
    }

    async fn transcode(&self, spec: &TranscodeSpec, on_progress: FractionCallback) -> MediaResult<()> {
        let total = spec.range.duration();
        info!(
            input = %spec.input.display(),
            output = %spec.output.display(),
            duration = total,
            resolution = %spec.resolution,
            "Transcoding"
        );
        let cmd = transcode_command(spec).to_tool_command();
        self.runner
            .run_with_progress(&cmd, move |p| on_progress(p.fraction(total)))
            .await
            .map_err(MediaError::during_transcode)?;
        ensure_nonempty(&spec.output).await?;
        Ok(())
    }
}
