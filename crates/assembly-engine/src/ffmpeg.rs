//! ffmpeg / ffprobe process runner.
//!
//! Every encode, decode, and probe in the pipeline goes through
//! [`FfmpegTool`]. Children are spawned with `kill_on_drop`, so dropping a
//! job future or cancelling its token terminates any in-flight encode.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use shortreel_common::config::{RenderConfig, VideoConfig};
use shortreel_common::error::ReelError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Arguments every ffmpeg invocation starts with.
pub const BASE_ARGS: [&str; 4] = ["-y", "-hide_banner", "-loglevel", "error"];

/// Failure of an external media process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error while talking to {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },

    #[error("could not read ffprobe output for {path}: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("{program} was cancelled")]
    Cancelled { program: String },
}

impl ProcessError {
    /// Attribute this failure to a pipeline stage. Cancellation passes
    /// through unchanged.
    pub fn into_stage(self, wrap: impl FnOnce(String) -> ReelError) -> ReelError {
        match self {
            ProcessError::Cancelled { .. } => ReelError::Cancelled,
            other => wrap(other.to_string()),
        }
    }
}

impl From<ProcessError> for ReelError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Cancelled { .. } => ReelError::Cancelled,
            other => ReelError::media(other.to_string()),
        }
    }
}

/// Handle on the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTool {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    /// Run ffmpeg with [`BASE_ARGS`] prepended. Returns captured stdout.
    pub async fn run<I, S>(&self, args: I, cancel: &CancellationToken) -> Result<Vec<u8>, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut full: Vec<std::ffi::OsString> =
            BASE_ARGS.iter().map(|a| std::ffi::OsString::from(*a)).collect();
        full.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        execute(&self.ffmpeg, &full, cancel).await
    }

    /// Probe a media file.
    pub async fn probe(&self, path: &Path, cancel: &CancellationToken) -> Result<MediaInfo, ProcessError> {
        let args: Vec<std::ffi::OsString> = vec![
            "-v".into(),
            "error".into(),
            "-print_format".into(),
            "json".into(),
            "-show_streams".into(),
            "-show_format".into(),
            path.as_os_str().to_os_string(),
        ];
        let stdout = execute(&self.ffprobe, &args, cancel).await?;
        parse_probe_output(&stdout).map_err(|e| ProcessError::Probe {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Whether both ffmpeg and ffprobe can be executed.
    pub async fn is_available(&self) -> bool {
        let token = CancellationToken::new();
        let version = ["-version"];
        execute(&self.ffmpeg, &version, &token).await.is_ok()
            && execute(&self.ffprobe, &version, &token).await.is_ok()
    }

    /// Whether this ffmpeg build ships the named filter (e.g. `drawtext`).
    pub async fn has_filter(&self, name: &str) -> bool {
        let token = CancellationToken::new();
        match execute(&self.ffmpeg, &["-hide_banner", "-filters"], &token).await {
            Ok(stdout) => filter_list_contains(&String::from_utf8_lossy(&stdout), name),
            Err(e) => {
                tracing::debug!(error = %e, "Could not list ffmpeg filters");
                false
            }
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }
}

async fn execute<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ProcessError> {
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());

    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled { program: name });
    }

    tracing::debug!(
        program = %name,
        args = ?args.iter().map(|a| a.as_ref().to_string_lossy()).collect::<Vec<_>>(),
        "Running media tool"
    );

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProcessError::Spawn {
            program: name.clone(),
            source: e,
        })?;

    let stdout = child.stdout.take().ok_or_else(|| ProcessError::Io {
        program: name.clone(),
        source: std::io::Error::other("stdout was not captured"),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| ProcessError::Io {
        program: name.clone(),
        source: std::io::Error::other("stderr was not captured"),
    })?;

    // Both pipes are drained while waiting so a chatty child never blocks.
    let outcome = tokio::select! {
        result = async { tokio::join!(child.wait(), read_all(stdout), read_all(stderr)) } => Some(result),
        _ = cancel.cancelled() => None,
    };

    let Some((status, stdout, stderr)) = outcome else {
        let _ = child.start_kill();
        let _ = child.wait().await;
        tracing::debug!(program = %name, "Media tool killed after cancellation");
        return Err(ProcessError::Cancelled { program: name });
    };

    let io_err = |source| ProcessError::Io {
        program: name.clone(),
        source,
    };
    let status = status.map_err(io_err)?;
    let stdout = stdout.map_err(io_err)?;
    let stderr = stderr.map_err(io_err)?;

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        return Err(ProcessError::Failed {
            program: name,
            status: status.to_string(),
            stderr: truncate_stderr(&stderr),
        });
    }
    Ok(stdout)
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Keep the tail of long stderr output; ffmpeg prints the cause last.
fn truncate_stderr(stderr: &str) -> String {
    const LIMIT: usize = 2000;
    if stderr.len() <= LIMIT {
        return stderr.to_string();
    }
    let mut start = stderr.len() - LIMIT;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &stderr[start..])
}

fn filter_list_contains(listing: &str, name: &str) -> bool {
    listing.lines().any(|line| {
        let mut fields = line.split_whitespace();
        // Layout: " T.C drawtext  V->V  Draw text on top of video..."
        matches!((fields.next(), fields.next()), (Some(_), Some(filter)) if filter == name)
    })
}

/// Encoder arguments shared by every video the pipeline writes, so all
/// intermediate clips are stream-compatible.
pub fn video_encode_args(video: &VideoConfig) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        video.video_codec.clone(),
        "-preset".to_string(),
        video.preset.clone(),
        "-pix_fmt".to_string(),
        video.pixel_format.clone(),
        "-b:v".to_string(),
        format!("{}k", video.video_bitrate_kbps),
        "-r".to_string(),
        video.fps.to_string(),
        "-video_track_timescale".to_string(),
        (video.fps * 1000).to_string(),
    ]
}

/// Quote a value for use inside an ffmpeg filter graph.
pub fn quote_filter_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "/").replace('\'', "'\\''"))
}

/// Parsed `ffprobe` output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub format_name: Option<String>,
    /// Container duration in seconds.
    pub duration: Option<f64>,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub profile: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub pix_fmt: Option<String>,
    pub sample_aspect_ratio: Option<String>,
    pub time_base: Option<String>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub duration: Option<f64>,
}

impl MediaInfo {
    /// Best duration estimate: container first, then the video stream.
    pub fn best_duration(&self) -> Option<f64> {
        self.duration
            .or_else(|| self.video.as_ref().and_then(|v| v.duration))
            .or_else(|| self.audio.as_ref().and_then(|a| a.duration))
    }
}

impl VideoStreamInfo {
    /// Parameters that must match for a stream-copy concat.
    pub fn concat_signature(&self) -> String {
        format!(
            "{}|{}|{}x{}|{}|{:.3}|{}|{}",
            self.codec,
            self.profile.as_deref().unwrap_or("-"),
            self.width,
            self.height,
            self.pix_fmt.as_deref().unwrap_or("-"),
            self.fps,
            self.time_base.as_deref().unwrap_or("-"),
            self.sample_aspect_ratio.as_deref().unwrap_or("1:1"),
        )
    }
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    sample_aspect_ratio: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    time_base: Option<String>,
    duration: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json -show_streams -show_format` output.
pub fn parse_probe_output(stdout: &[u8]) -> Result<MediaInfo, serde_json::Error> {
    let parsed: ProbeOut = serde_json::from_slice(stdout)?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| {
            let fps = s
                .avg_frame_rate
                .as_deref()
                .and_then(parse_rational)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_rational))
                .unwrap_or(0.0);
            Some(VideoStreamInfo {
                codec: s.codec_name.clone().unwrap_or_default(),
                profile: s.profile.clone(),
                width: s.width?,
                height: s.height?,
                fps,
                pix_fmt: s.pix_fmt.clone(),
                sample_aspect_ratio: s.sample_aspect_ratio.clone(),
                time_base: s.time_base.clone(),
                duration: s.duration.as_deref().and_then(parse_secs),
            })
        });

    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioStreamInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
            channels: s.channels,
            duration: s.duration.as_deref().and_then(parse_secs),
        });

    let (format_name, duration) = match parsed.format {
        Some(f) => (f.format_name, f.duration.as_deref().and_then(parse_secs)),
        None => (None, None),
    };

    Ok(MediaInfo {
        format_name,
        duration,
        video,
        audio,
    })
}

fn parse_secs(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_rational(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num == 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "h264", "profile": "High", "codec_type": "video",
             "width": 1080, "height": 1920, "pix_fmt": "yuv420p", "sample_aspect_ratio": "1:1",
             "r_frame_rate": "30/1", "avg_frame_rate": "30/1", "time_base": "1/30000",
             "duration": "3.000000"},
            {"index": 1, "codec_name": "aac", "codec_type": "audio",
             "sample_rate": "48000", "channels": 2, "duration": "2.998000"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "3.000000", "size": "12345"}
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(PROBE_JSON.as_bytes()).unwrap();
        let video = info.video.as_ref().unwrap();
        assert_eq!(video.codec, "h264");
        assert_eq!((video.width, video.height), (1080, 1920));
        assert!((video.fps - 30.0).abs() < 1e-9);
        let audio = info.audio.as_ref().unwrap();
        assert_eq!(audio.codec, "aac");
        assert_eq!(audio.sample_rate, Some(48000));
        assert_eq!(info.best_duration(), Some(3.0));
    }

    #[test]
    fn test_parse_probe_without_audio_or_format() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "png",
            "width": 640, "height": 480, "r_frame_rate": "25/1", "avg_frame_rate": "0/0"}]}"#;
        let info = parse_probe_output(json.as_bytes()).unwrap();
        assert!(info.audio.is_none());
        assert!(info.duration.is_none());
        assert!((info.video.unwrap().fps - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_concat_signature_detects_mismatch() {
        let info = parse_probe_output(PROBE_JSON.as_bytes()).unwrap();
        let a = info.video.unwrap();
        let mut b = a.clone();
        assert_eq!(a.concat_signature(), b.concat_signature());
        b.width = 720;
        assert_ne!(a.concat_signature(), b.concat_signature());
    }

    #[test]
    fn test_filter_list_contains() {
        let listing = "Filters:\n  T.. = Timeline support\n ---\n T.C drawtext           V->V       Draw text on top of video frames using libfreetype library.\n ... fps               V->V       Force constant framerate.\n";
        assert!(filter_list_contains(listing, "drawtext"));
        assert!(filter_list_contains(listing, "fps"));
        assert!(!filter_list_contains(listing, "draw"));
    }

    #[test]
    fn test_quote_filter_value_escapes_quotes() {
        assert_eq!(quote_filter_value("/tmp/a b.txt"), "'/tmp/a b.txt'");
        assert_eq!(quote_filter_value("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_truncate_stderr_keeps_tail() {
        let long = format!("{}END", "x".repeat(5000));
        let truncated = truncate_stderr(&long);
        assert!(truncated.starts_with("..."));
        assert!(truncated.ends_with("END"));
        assert!(truncated.len() < 2100);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let tool = FfmpegTool::new("/nonexistent/ffmpeg-shortreel", "/nonexistent/ffprobe");
        let err = tool.run(["-version"], &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(!tool.is_available().await);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let tool = FfmpegTool::new("ffmpeg", "ffprobe");
        let token = CancellationToken::new();
        token.cancel();
        let err = tool.run(["-version"], &token).await.unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }));
        assert!(matches!(ReelError::from(err), ReelError::Cancelled));
    }
}
