//! Application configuration.
//!
//! The canonical output format (width/height/fps) is established once at
//! startup and shared read-only by every assembly job.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReelError, ReelResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where finished videos are written when no explicit path is given.
    pub output_dir: PathBuf,

    /// Parent directory for per-job working directories (system temp dir if unset).
    pub temp_root: Option<PathBuf>,

    /// Canonical output format and encoder settings.
    pub video: VideoConfig,

    /// Font resolution for text scenes and captions.
    pub fonts: FontConfig,

    /// Render stage tuning.
    pub render: RenderConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Canonical output format and encoder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,

    /// ffmpeg video encoder name.
    pub video_codec: String,

    /// x264 preset.
    pub preset: String,

    pub pixel_format: String,

    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// ffmpeg audio encoder name.
    pub audio_codec: String,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Sample rate used for decoding and mixing audio tracks.
    pub audio_sample_rate: u32,
}

/// Font lookup order: preferred file, fallback files, then a fontconfig family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub preferred: Option<PathBuf>,
    pub fallbacks: Vec<PathBuf>,
    pub fallback_family: String,
}

/// Render stage tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Upper bound on scenes encoded at once (0 = derive from available cores).
    pub max_parallel_scenes: usize,

    /// ffmpeg binary (name on PATH or absolute path).
    pub ffmpeg_path: PathBuf,

    /// ffprobe binary (name on PATH or absolute path).
    pub ffprobe_path: PathBuf,

    /// Canvas color for text scenes.
    pub text_background: String,

    /// Text color for text scenes.
    pub text_color: String,

    /// Font size for text scenes, in pixels.
    pub text_font_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "shortreel=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

/// Fixed target resolution and frame rate every clip is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CanonicalFormat {
    /// Duration of one frame in seconds.
    pub fn frame_interval_secs(&self) -> f64 {
        1.0 / self.fps.max(1) as f64
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            temp_root: None,
            video: VideoConfig::default(),
            fonts: FontConfig::default(),
            render: RenderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            pixel_format: "yuv420p".to_string(),
            video_bitrate_kbps: 5000,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
            audio_sample_rate: 48000,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            preferred: None,
            fallbacks: vec![
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
                PathBuf::from("/usr/share/fonts/TTF/DejaVuSans.ttf"),
                PathBuf::from("/System/Library/Fonts/Helvetica.ttc"),
                PathBuf::from("C:\\Windows\\Fonts\\arial.ttf"),
            ],
            fallback_family: "Sans".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_parallel_scenes: 0,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            text_background: "#1a1a1a".to_string(),
            text_color: "#FFFFFF".to_string(),
            text_font_size: 72,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl VideoConfig {
    pub fn canonical(&self) -> CanonicalFormat {
        CanonicalFormat {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }
}

impl RenderConfig {
    /// Effective size of the scene worker pool.
    pub fn scene_concurrency(&self) -> usize {
        if self.max_parallel_scenes > 0 {
            return self.max_parallel_scenes;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .clamp(1, 8)
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults,
    /// then apply environment overrides.
    pub fn load() -> Self {
        let config_path = config_file_path();
        let mut config = Self::default();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(parsed) => config = parsed,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], a
    /// missing or malformed file is an error.
    pub fn load_from(path: &Path) -> ReelResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReelError::config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let mut config: Self = serde_json::from_str(&content).map_err(|e| {
            ReelError::config(format!("Failed to parse config {}: {e}", path.display()))
        })?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply deployment overrides. Unparseable numeric values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let parse_u32 = |key: &str| -> Option<u32> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u32>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "Ignoring non-numeric override");
                    None
                }
            }
        };

        if let Some(width) = parse_u32("VIDEO_WIDTH") {
            self.video.width = width;
        }
        if let Some(height) = parse_u32("VIDEO_HEIGHT") {
            self.video.height = height;
        }
        if let Some(fps) = parse_u32("VIDEO_FPS") {
            self.video.fps = fps;
        }
        if let Some(font) = lookup("SHORTREEL_FONT") {
            self.fonts.preferred = Some(PathBuf::from(font));
        }
        if let Some(dir) = lookup("SHORTREEL_TEMP_DIR") {
            self.temp_root = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("SHORTREEL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(bin) = lookup("SHORTREEL_FFMPEG") {
            self.render.ffmpeg_path = PathBuf::from(bin);
        }
        if let Some(bin) = lookup("SHORTREEL_FFPROBE") {
            self.render.ffprobe_path = PathBuf::from(bin);
        }
    }

    /// Reject settings the encoder cannot honor.
    pub fn validate(&self) -> ReelResult<()> {
        let video = &self.video;
        if video.width == 0 || video.height == 0 {
            return Err(ReelError::config("video width/height must be non-zero"));
        }
        if video.width % 2 != 0 || video.height % 2 != 0 {
            return Err(ReelError::config(format!(
                "video width/height must be even for {} output (got {}x{})",
                video.pixel_format, video.width, video.height
            )));
        }
        if video.fps == 0 {
            return Err(ReelError::config("video fps must be non-zero"));
        }
        if video.audio_sample_rate == 0 {
            return Err(ReelError::config("audio sample rate must be non-zero"));
        }
        if self.render.text_font_size == 0 {
            return Err(ReelError::config("text font size must be non-zero"));
        }
        Ok(())
    }

    /// Parent directory for job workspaces.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("shortreel").join("config.json")
}
