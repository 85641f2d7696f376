//! Source acquisition using yt-dlp.
//!
//! Two modes: a ranged download through `--download-sections` (the smart
//! path) and a full download that is cut locally afterwards.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use vtrim_models::timestamp::format_seconds;
use vtrim_models::TrimRange;

use crate::command::{ToolCommand, YT_DLP};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::ensure_nonempty;
use crate::process::ProcessRunner;

/// Minimum size for a valid cookies file (bytes).
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Options shared by every yt-dlp invocation.
#[derive(Debug, Clone, Default)]
pub struct YtDlpOptions {
    /// Netscape cookies file passed with `--cookies`
    pub cookies_path: Option<PathBuf>,
    /// Download rate limit, e.g. `2M`
    pub limit_rate: Option<String>,
}

impl YtDlpOptions {
    /// Load options from environment variables.
    pub fn from_env() -> Self {
        let cookies_path = std::env::var("YTDLP_COOKIES_PATH")
            .ok()
            .map(PathBuf::from)
            .filter(|p| is_usable_cookies_file(p));
        Self {
            cookies_path,
            limit_rate: std::env::var("YTDLP_LIMIT_RATE").ok().filter(|s| !s.is_empty()),
        }
    }

    fn apply(&self, mut cmd: ToolCommand) -> ToolCommand {
        if let Some(rate) = &self.limit_rate {
            cmd = cmd.args(["--limit-rate", rate.as_str()]);
        }
        if let Some(cookies) = &self.cookies_path {
            cmd = cmd.arg("--cookies").arg(cookies.to_string_lossy());
        }
        cmd
    }
}

/// Validate that a cookies file exists and appears to be in Netscape format.
fn is_usable_cookies_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        debug!("Cookies file not found at {}, skipping", path.display());
        return false;
    };
    if metadata.len() < MIN_COOKIES_FILE_SIZE {
        warn!("Cookies file {} is too small, skipping", path.display());
        return false;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => is_valid_netscape_cookies(&content),
        Err(e) => {
            warn!("Failed to read cookies file: {}", e);
            false
        }
    }
}

fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File") || content.starts_with("# HTTP Cookie File") {
        return true;
    }
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .any(|l| l.split('\t').count() >= 6)
}

fn base_command(opts: &YtDlpOptions) -> ToolCommand {
    opts.apply(
        ToolCommand::new(YT_DLP).args(["--no-playlist", "--no-progress", "--no-warnings", "--quiet"]),
    )
}

/// Ranged download of `range` into `output`.
pub fn segment_command(
    url: &str,
    format_id: &str,
    range: TrimRange,
    output: &Path,
    opts: &YtDlpOptions,
) -> ToolCommand {
    let section = format!("*{}-{}", format_seconds(range.start()), format_seconds(range.end()));
    base_command(opts)
        .args(["--download-sections", section.as_str()])
        .args(["-f", format_id])
        .args(["--merge-output-format", "mkv"])
        .arg("-o")
        .arg(output.to_string_lossy())
        .arg("--")
        .arg(url)
}

/// Full download of the source into `output`.
pub fn full_download_command(url: &str, format_id: &str, output: &Path, opts: &YtDlpOptions) -> ToolCommand {
    base_command(opts)
        .args(["-f", format_id])
        .args(["--merge-output-format", "mkv"])
        .arg("-o")
        .arg(output.to_string_lossy())
        .arg("--")
        .arg(url)
}

/// Metadata dump without downloading.
pub fn dump_json_command(url: &str, opts: &YtDlpOptions) -> ToolCommand {
    base_command(opts)
        .args(["--dump-json", "--skip-download"])
        .arg("--")
        .arg(url)
}

/// Download only `range` of a remote source.
///
/// May fail for sources that cannot be fetched by section; callers fall
/// back to a full download.
pub async fn download_segment(
    runner: &ProcessRunner,
    url: &str,
    format_id: &str,
    range: TrimRange,
    output: &Path,
    opts: &YtDlpOptions,
) -> MediaResult<()> {
    info!(
        start = range.start(),
        end = range.end(),
        output = %output.display(),
        "Attempting segment download with yt-dlp --download-sections"
    );

    runner
        .run(&segment_command(url, format_id, range, output, opts))
        .await
        .map_err(MediaError::during_acquisition)?;
    let size = ensure_nonempty(output)
        .await
        .map_err(MediaError::during_acquisition)?;

    info!(
        output = %output.display(),
        size_mb = size as f64 / (1024.0 * 1024.0),
        "Downloaded video segment"
    );
    Ok(())
}

/// Download a whole remote source.
pub async fn download_video(
    runner: &ProcessRunner,
    url: &str,
    format_id: &str,
    output: &Path,
    opts: &YtDlpOptions,
) -> MediaResult<()> {
    info!(output = %output.display(), "Downloading full source");

    runner
        .run(&full_download_command(url, format_id, output, opts))
        .await
        .map_err(MediaError::during_acquisition)?;
    let size = ensure_nonempty(output)
        .await
        .map_err(MediaError::during_acquisition)?;

    info!(
        output = %output.display(),
        size_mb = size as f64 / (1024.0 * 1024.0),
        "Downloaded full source"
    );
    Ok(())
}
