//! Command builders for the external media tools.

use std::path::{Path, PathBuf};

use vtrim_models::{Container, EncodingConfig, Resolution, TrimRange};

use crate::error::{MediaError, MediaResult};

/// An external tool invocation: program name plus argument list.
///
/// Arguments are passed to the process directly; nothing goes through a
/// shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    tool: &'static str,
    args: Vec<String>,
}

impl ToolCommand {
    pub fn new(tool: &'static str) -> Self {
        Self {
            tool,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Command line for logs, with URL query strings (signatures) removed.
    pub fn redacted(&self) -> String {
        let mut line = String::from(self.tool);
        for arg in &self.args {
            line.push(' ');
            if arg.starts_with("http://") || arg.starts_with("https://") {
                line.push_str(arg.split('?').next().unwrap_or(arg));
                if arg.contains('?') {
                    line.push_str("?…");
                }
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or URL
    input: String,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command reading a local file.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::from_input(input.as_ref().to_string_lossy(), output)
    }

    /// Create a new FFmpeg command reading from a URL or other input spec.
    pub fn from_input(input: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.into(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Input seek (fast, keyframe based).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Input read duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Frame-accurate cut applied on the output side.
    pub fn cut(self, range: TrimRange) -> Self {
        self.output_args([
            "-ss".to_string(),
            format!("{:.3}", range.start()),
            "-to".to_string(),
            format!("{:.3}", range.end()),
        ])
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Copy all selected streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Apply codec, preset and bitrate settings.
    pub fn encoding(self, config: &EncodingConfig) -> Self {
        self.output_args(config.to_ffmpeg_args())
    }

    /// Container-specific muxer flags.
    pub fn container(self, container: Container) -> Self {
        match container {
            Container::Mp4 | Container::Mov => self.output_args(["-movflags", "+faststart"]),
            Container::Mkv | Container::Webm => self,
        }
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());
        args.push("-nostats".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }

    pub fn to_tool_command(&self) -> ToolCommand {
        ToolCommand::new(FFMPEG).args(self.build_args())
    }
}

pub const FFMPEG: &str = "ffmpeg";
pub const YT_DLP: &str = "yt-dlp";

/// Everything the local transcode needs.
#[derive(Debug, Clone)]
pub struct TranscodeSpec {
    pub input: PathBuf,
    pub output: PathBuf,
    pub range: TrimRange,
    pub container: Container,
    pub resolution: Resolution,
    pub encoding: EncodingConfig,
}

/// Deterministic re-encode of `range` from a local file.
///
/// Same spec, same argument list.
pub fn transcode_command(spec: &TranscodeSpec) -> FfmpegCommand {
    FfmpegCommand::new(&spec.input, &spec.output)
        .cut(spec.range)
        .video_filter(spec.resolution.scale_filter())
        .encoding(&spec.encoding)
        .container(spec.container)
}

/// Stream-copy a local file into `container`.
pub fn remux_command(input: &Path, output: &Path, container: Container) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .stream_copy()
        .container(container)
}

/// Extract `range` from a remote URL by seeking, with stream copy.
pub fn seek_copy_command(url: &str, range: TrimRange, output: &Path, container: Container) -> FfmpegCommand {
    FfmpegCommand::from_input(url, output)
        .seek(range.start())
        .duration(range.duration())
        .stream_copy()
        .container(container)
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which(FFMPEG).map_err(|_| MediaError::ToolNotFound(FFMPEG))
}

/// Check if yt-dlp is available.
pub fn check_ytdlp() -> MediaResult<PathBuf> {
    which::which(YT_DLP).map_err(|_| MediaError::ToolNotFound(YT_DLP))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TranscodeSpec {
        TranscodeSpec {
            input: PathBuf::from("/work/j1/source.mp4"),
            output: PathBuf::from("/work/j1/output.mp4"),
            range: TrimRange::new(10.0, 40.5).unwrap(),
            container: Container::Mp4,
            resolution: Resolution::default(),
            encoding: EncodingConfig::default(),
        }
    }

    #[test]
    fn test_transcode_command_exact() {
        let args = transcode_command(&spec()).build_args();
        let expected: Vec<String> = [
            "-y", "-v", "error", "-progress", "pipe:2", "-nostats",
            "-i", "/work/j1/source.mp4",
            "-ss", "10.000", "-to", "40.500",
            "-vf", "scale=1280:720",
            "-c:v", "libx264", "-preset", "medium",
            "-c:a", "aac", "-b:a", "192k",
            "-movflags", "+faststart",
            "/work/j1/output.mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_transcode_command_deterministic() {
        assert_eq!(
            transcode_command(&spec()).build_args(),
            transcode_command(&spec()).build_args()
        );
    }

    #[test]
    fn test_seek_copy_uses_input_seek() {
        let range = TrimRange::new(5.0, 15.0).unwrap();
        let args = seek_copy_command("https://bucket/obj?sig=1", range, Path::new("out.mkv"), Container::Mkv)
            .build_args();
        let i = args.iter().position(|a| a == "-i").unwrap();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert!(ss < i);
        assert!(args.contains(&"copy".to_string()));
        assert!(!args.contains(&"-movflags".to_string()));
    }

    #[test]
    fn test_redacted_strips_signatures() {
        let cmd = ToolCommand::new(FFMPEG).args(["-i", "https://bucket.example/obj.mp4?X-Amz-Signature=abc"]);
        let line = cmd.redacted();
        assert!(line.contains("https://bucket.example/obj.mp4"));
        assert!(!line.contains("abc"));
    }
}
