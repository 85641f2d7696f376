//! Output container, resolution and encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "medium";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// Default output size when none is requested.
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Largest accepted output edge.
pub const MAX_DIMENSION: u32 = 7680;

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mkv,
    Webm,
    Mov,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "mkv",
            Container::Webm => "webm",
            Container::Mov => "mov",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Mkv => "video/x-matroska",
            Container::Webm => "video/webm",
            Container::Mov => "video/quicktime",
        }
    }

    /// Codecs used when re-encoding into this container.
    pub fn codecs(&self) -> (&'static str, &'static str) {
        match self {
            Container::Webm => ("libvpx-vp9", "libopus"),
            _ => (DEFAULT_VIDEO_CODEC, DEFAULT_AUDIO_CODEC),
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Container::Mp4),
            "mkv" | "matroska" => Ok(Container::Mkv),
            "webm" => Ok(Container::Webm),
            "mov" | "quicktime" => Ok(Container::Mov),
            other => Err(other.to_string()),
        }
    }
}

/// Target frame size.
///
/// Parses `1280:720`, `1280x720` and `720p` (16:9). Serialized as `WxH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        let valid = |v: u32| (2..=MAX_DIMENSION).contains(&v) && v % 2 == 0;
        (valid(width) && valid(height)).then_some(Self { width, height })
    }

    /// ffmpeg `-vf` value.
    pub fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let parsed = if let Some(h) = s.strip_suffix('p') {
            h.parse::<u32>().ok().and_then(|height| {
                // 16:9, rounded to an even width for yuv420p
                let width = ((height as u64 * 16 / 9) as u32 + 1) & !1;
                Resolution::new(width, height)
            })
        } else {
            s.split_once(|c| c == 'x' || c == ':').and_then(|(w, h)| {
                let w = w.trim().parse().ok()?;
                let h = h.trim().parse().ok()?;
                Resolution::new(w, h)
            })
        };
        parsed.ok_or(s)
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// Video encoding configuration for the local transcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Target video bitrate; encoder default when unset
    #[serde(default)]
    pub video_bitrate: Option<String>,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            video_bitrate: None,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }
}

impl EncodingConfig {
    /// Defaults adjusted to what the container can hold.
    pub fn for_container(container: Container) -> Self {
        let (codec, audio_codec) = container.codecs();
        Self {
            codec: codec.to_string(),
            audio_codec: audio_codec.to_string(),
            ..Default::default()
        }
    }

    pub fn with_video_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.video_bitrate = Some(bitrate.into());
        self
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
        ];

        if let Some(bitrate) = &self.video_bitrate {
            args.extend_from_slice(&["-b:v".to_string(), bitrate.clone()]);
        }

        args.extend_from_slice(&[
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]);

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.preset, "medium");
        assert_eq!(config.audio_bitrate, "192k");
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = EncodingConfig::default().with_video_bitrate("2M").to_ffmpeg_args();
        assert_eq!(
            args,
            vec!["-c:v", "libx264", "-preset", "medium", "-b:v", "2M", "-c:a", "aac", "-b:a", "192k"]
        );
    }

    #[test]
    fn test_webm_codecs() {
        let config = EncodingConfig::for_container(Container::Webm);
        assert_eq!(config.codec, "libvpx-vp9");
        assert_eq!(config.audio_codec, "libopus");
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("1280:720".parse::<Resolution>().unwrap(), Resolution::default());
        assert_eq!("1920x1080".parse::<Resolution>().unwrap().height, 1080);
        assert_eq!("720p".parse::<Resolution>().unwrap(), Resolution::default());
        assert_eq!("1080p".parse::<Resolution>().unwrap().width, 1920);
        assert!("abc".parse::<Resolution>().is_err());
        assert!("0x0".parse::<Resolution>().is_err());
        assert!("1281x720".parse::<Resolution>().is_err());
        assert!("99999x720".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_serde_as_string() {
        let json = serde_json::to_string(&Resolution::default()).unwrap();
        assert_eq!(json, r#""1280x720""#);
        let back: Resolution = serde_json::from_str(r#""854:480""#).unwrap();
        assert_eq!(back.scale_filter(), "scale=854:480");
    }

    #[test]
    fn test_container_parsing() {
        assert_eq!("MP4".parse::<Container>().unwrap(), Container::Mp4);
        assert_eq!("quicktime".parse::<Container>().unwrap(), Container::Mov);
        assert!("avi".parse::<Container>().is_err());
        assert_eq!(Container::Mkv.content_type(), "video/x-matroska");
    }
}
