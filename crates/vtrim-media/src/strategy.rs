//! Smart trim with bounded fallback to a local transcode.
//!
//! The smart path asks the remote side for just the requested range and
//! copies streams. When it fails for any reason, the strategy downloads the
//! full source and cuts locally, but only for ranges up to the fallback
//! ceiling. Longer ranges fail with `DurationTooLong` before any fallback
//! process is spawned.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use vtrim_models::{Container, EncodingConfig, Resolution, TrimRange};

use crate::command::TranscodeSpec;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_nonempty, remove_if_exists};
use crate::progress::FractionCallback;
use crate::toolkit::{MediaToolkit, SourceInput};

/// Default ceiling for the fallback path (30 minutes).
pub const DEFAULT_FALLBACK_CEILING_SECS: f64 = 1800.0;

/// Which path produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPath {
    Smart,
    Fallback,
}

impl TransformPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformPath::Smart => "smart",
            TransformPath::Fallback => "fallback",
        }
    }
}

/// One transform to perform.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub source: SourceInput,
    pub range: TrimRange,
    pub container: Container,
    /// Explicit output size; forces the re-encode path
    pub resolution: Option<Resolution>,
    pub work_dir: PathBuf,
    pub output: PathBuf,
}

/// Result of a successful transform.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub path: TransformPath,
    pub output: PathBuf,
    pub size_bytes: u64,
}

/// Decides between smart and fallback trims.
pub struct TransformStrategy<T> {
    toolkit: T,
    fallback_ceiling_secs: f64,
}

impl<T: MediaToolkit> TransformStrategy<T> {
    pub fn new(toolkit: T) -> Self {
        Self {
            toolkit,
            fallback_ceiling_secs: DEFAULT_FALLBACK_CEILING_SECS,
        }
    }

    pub fn with_fallback_ceiling(mut self, secs: f64) -> Self {
        self.fallback_ceiling_secs = secs;
        self
    }

    pub fn fallback_ceiling_secs(&self) -> f64 {
        self.fallback_ceiling_secs
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    /// Produce `req.output`. Progress is reported as a fraction of the
    /// transform stage.
    pub async fn execute(
        &self,
        req: &TransformRequest,
        on_progress: FractionCallback,
    ) -> MediaResult<TransformOutcome> {
        let smart_error = if req.resolution.is_some() {
            // stream copy cannot resize
            None
        } else {
            let started = Instant::now();
            let smart = match self
                .toolkit
                .smart_trim(&req.source, req.range, req.container, &req.work_dir, &req.output)
                .await
            {
                Ok(()) => ensure_nonempty(&req.output).await,
                Err(e) => Err(e),
            };
            match smart {
                Ok(size_bytes) => {
                    info!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        size_bytes, "Smart trim succeeded"
                    );
                    on_progress(1.0);
                    return Ok(TransformOutcome {
                        path: TransformPath::Smart,
                        output: req.output.clone(),
                        size_bytes,
                    });
                }
                Err(e) => Some(e),
            }
        };

        let requested = req.range.duration();
        if requested > self.fallback_ceiling_secs {
            warn!(
                requested,
                ceiling = self.fallback_ceiling_secs,
                smart_error = ?smart_error.as_ref().map(|e| e.to_string()),
                "Fallback refused: range exceeds ceiling"
            );
            return Err(MediaError::DurationTooLong {
                requested,
                ceiling: self.fallback_ceiling_secs,
            });
        }

        if let Some(e) = &smart_error {
            warn!(error = %e, kind = %e.kind(), "Smart trim failed, falling back to local transcode");
        }
        discard_partial(&req.output).await;

        self.fallback(req, on_progress).await
    }

    async fn fallback(
        &self,
        req: &TransformRequest,
        on_progress: FractionCallback,
    ) -> MediaResult<TransformOutcome> {
        let started = Instant::now();
        let input = self.toolkit.download_full(&req.source, &req.work_dir).await?;

        let spec = TranscodeSpec {
            input,
            output: req.output.clone(),
            range: req.range,
            container: req.container,
            resolution: req.resolution.unwrap_or_default(),
            encoding: EncodingConfig::for_container(req.container),
        };
        self.toolkit.transcode(&spec, on_progress.clone()).await?;

        let size_bytes = ensure_nonempty(&req.output)
            .await
            .map_err(MediaError::during_transcode)?;
        on_progress(1.0);
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            size_bytes, "Fallback transcode succeeded"
        );
        Ok(TransformOutcome {
            path: TransformPath::Fallback,
            output: req.output.clone(),
            size_bytes,
        })
    }
}

async fn discard_partial(output: &Path) {
    if let Err(e) = remove_if_exists(output).await {
        warn!("Failed to remove partial output {}: {}", output.display(), e);
    }
}
