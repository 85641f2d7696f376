//! Source metadata via `yt-dlp --dump-json`.

use serde::Deserialize;

use vtrim_models::{FormatInfo, SourceInfo};

use crate::download::{dump_json_command, YtDlpOptions};
use crate::error::{MediaError, MediaResult};
use crate::process::ProcessRunner;

/// The subset of yt-dlp's info dict we read.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    format_note: Option<String>,
    height: Option<u32>,
    ext: Option<String>,
    vcodec: Option<String>,
}

impl YtDlpFormat {
    fn resolution(&self) -> String {
        if let Some(note) = self.format_note.as_deref().filter(|n| !n.is_empty()) {
            return note.to_string();
        }
        match (self.height, self.vcodec.as_deref()) {
            (Some(h), _) => format!("{h}p"),
            (None, Some("none")) => "audio only".to_string(),
            _ => "unknown".to_string(),
        }
    }
}

/// Parse yt-dlp's JSON into a [`SourceInfo`].
pub fn parse_source_info(stdout: &[u8]) -> MediaResult<SourceInfo> {
    // playlists print one object per line; the first entry wins
    let first_line = stdout
        .split(|b| *b == b'\n')
        .find(|line| !line.iter().all(u8::is_ascii_whitespace))
        .ok_or_else(|| MediaError::SourceUnavailable("yt-dlp returned no metadata".into()))?;
    let info: YtDlpInfo = serde_json::from_slice(first_line)?;

    Ok(SourceInfo {
        title: info.title.unwrap_or_default(),
        thumbnail: info.thumbnail,
        duration: info.duration.filter(|d| d.is_finite() && *d > 0.0),
        formats: info
            .formats
            .iter()
            .map(|f| FormatInfo {
                format_id: f.format_id.clone(),
                resolution: f.resolution(),
                ext: f.ext.clone().unwrap_or_default(),
            })
            .collect(),
    })
}

/// Fetch metadata for a remote source.
pub async fn probe_source(runner: &ProcessRunner, url: &str, opts: &YtDlpOptions) -> MediaResult<SourceInfo> {
    let output = runner
        .run(&dump_json_command(url, opts))
        .await
        .map_err(MediaError::during_acquisition)?;
    parse_source_info(&output.stdout)
}
