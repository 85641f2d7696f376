//! Source video metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Summary of a remote source as reported by yt-dlp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Duration in seconds, when the extractor knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub formats: Vec<FormatInfo>,
}

/// One selectable format of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormatInfo {
    pub format_id: String,
    pub resolution: String,
    pub ext: String,
}
