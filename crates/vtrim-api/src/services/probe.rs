//! Source metadata lookup.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use vtrim_media::{probe_source, MediaResult, ProcessRunner, YtDlpOptions};
use vtrim_models::SourceInfo;

/// Probes are interactive; do not let one hold a request for long.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolves metadata for a remote source URL.
#[async_trait]
pub trait SourceProber: Send + Sync {
    async fn probe(&self, url: &str) -> MediaResult<SourceInfo>;
}

/// `yt-dlp --dump-json` backed prober.
pub struct YtDlpProber {
    runner: ProcessRunner,
    options: YtDlpOptions,
}

impl YtDlpProber {
    pub fn new(options: YtDlpOptions) -> Self {
        Self {
            runner: ProcessRunner::new(PROBE_TIMEOUT),
            options,
        }
    }

    pub fn from_env() -> Self {
        Self::new(YtDlpOptions::from_env())
    }
}

#[async_trait]
impl SourceProber for YtDlpProber {
    async fn probe(&self, url: &str) -> MediaResult<SourceInfo> {
        let info = probe_source(&self.runner, url, &self.options).await?;
        debug!(
            title = %info.title,
            duration = ?info.duration,
            formats = info.formats.len(),
            "Probed source"
        );
        Ok(info)
    }
}
