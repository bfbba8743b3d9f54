//! Video script types: the input contract of the assembly pipeline.
//!
//! A script is an ordered list of scenes that together form the timeline,
//! plus captions burned onto that timeline and audio tracks mixed under it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shortreel_common::ReelError;

use crate::style::CaptionStyleSpec;

/// Top-level script document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Unique script identifier.
    pub id: String,

    /// Subject the script was written about.
    pub topic: String,

    /// Human-readable title.
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Intended total duration (seconds).
    pub total_duration: f64,

    /// Scenes in playback order.
    pub scenes: Vec<Scene>,

    /// Captions burned onto the timeline.
    #[serde(default)]
    pub captions: Vec<Caption>,

    /// Audio tracks mixed under the timeline.
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,

    /// Free-form metadata (hashtags, target platforms, creation time).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One timed segment of the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,

    /// Duration in seconds (> 0).
    pub duration: f64,

    /// What the scene shows.
    #[serde(flatten)]
    pub kind: SceneKind,

    /// Transition into this scene (`fade`, `cut`, `none`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,

    /// Transition length in seconds.
    #[serde(default)]
    pub transition_duration: f64,
}

/// Scene variants, tagged by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SceneKind {
    /// Centered text on a solid canvas.
    Text { content: String },

    /// A still image, fit to the frame by center-crop.
    Image {
        #[serde(rename = "content", alias = "url", alias = "source")]
        source: String,
    },

    /// A video clip, looped or trimmed to the scene duration.
    Video {
        #[serde(rename = "content", alias = "url", alias = "source")]
        source: String,
    },
}

impl SceneKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
        }
    }

    /// Asset reference for image/video scenes.
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image { source } | Self::Video { source } => Some(source),
        }
    }
}

/// Transition into a scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Cut,
    FadeIn { duration: f64 },
}

impl Scene {
    /// Interpret the transition fields. Unknown names are returned as the error
    /// so the caller can warn and fall back to a cut.
    pub fn transition(&self) -> Result<Transition, String> {
        let name = self
            .transition
            .as_deref()
            .map(|t| t.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match name.as_str() {
            "" | "none" | "cut" => Ok(Transition::Cut),
            "fade" | "fadein" | "fade_in" | "crossfade" | "dissolve" => {
                let duration = self.transition_duration.clamp(0.0, self.duration);
                if duration > 0.0 {
                    Ok(Transition::FadeIn { duration })
                } else {
                    Ok(Transition::Cut)
                }
            }
            _ => Err(name),
        }
    }
}

/// A timed caption. Fields are optional at parse time so that structural
/// defects surface as caption errors rather than parse errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Caption {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub start_time: Option<f64>,

    #[serde(default)]
    pub end_time: Option<f64>,

    #[serde(default)]
    pub style: CaptionStyleSpec,
}

/// The structural part of a caption once it has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTiming<'a> {
    pub text: &'a str,
    pub start: f64,
    pub end: f64,
}

impl Caption {
    /// Check the structural fields: non-blank text and finite start/end.
    pub fn timing(&self, index: usize) -> Result<CaptionTiming<'_>, ScriptError> {
        let text = match self.text.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            Some(_) => return Err(ScriptError::caption(index, "text is empty")),
            None => return Err(ScriptError::caption(index, "missing text")),
        };
        let start = self
            .start_time
            .ok_or_else(|| ScriptError::caption(index, "missing start_time"))?;
        let end = self
            .end_time
            .ok_or_else(|| ScriptError::caption(index, "missing end_time"))?;
        if !start.is_finite() || !end.is_finite() {
            return Err(ScriptError::caption(index, "start_time/end_time must be finite"));
        }
        Ok(CaptionTiming { text, start, end })
    }
}

/// Kind of audio track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioKind {
    #[default]
    Music,
    Voice,
}

/// An audio track placed on the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTrack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: AudioKind,

    /// Source reference resolved through the asset fetcher.
    #[serde(alias = "source")]
    pub url: String,

    /// Offset into the video timeline (seconds).
    #[serde(default)]
    pub start_time: f64,

    /// Linear gain 0.0..=1.0.
    #[serde(default = "default_volume")]
    pub volume: f64,

    #[serde(default)]
    pub fade_in: f64,

    #[serde(default)]
    pub fade_out: f64,
}

fn default_volume() -> f64 {
    1.0
}

impl AudioTrack {
    /// Human-readable label used in errors and warnings.
    pub fn label(&self, index: usize) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let kind = match self.kind {
                    AudioKind::Music => "music",
                    AudioKind::Voice => "voice",
                };
                format!("{kind} track #{index} ({})", self.url)
            }
        }
    }

    /// Volume clamped to 0.0..=1.0 (NaN counts as silent).
    pub fn effective_volume(&self) -> f64 {
        if self.volume.is_nan() {
            0.0
        } else {
            self.volume.clamp(0.0, 1.0)
        }
    }
}

impl Script {
    /// Parse a script from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a script from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ScriptError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&json)
    }

    /// Sum of scene durations (seconds).
    pub fn scenes_duration(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration).sum()
    }

    /// Platforms listed in metadata (`target_platforms`, or `platforms`).
    pub fn target_platforms(&self) -> Vec<String> {
        ["target_platforms", "platforms"]
            .iter()
            .find_map(|key| self.metadata.get(*key).and_then(|v| v.as_array()))
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_ascii_lowercase())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check the structural fields the pipeline depends on.
    ///
    /// Returns non-fatal warnings on success. `tolerance_secs` bounds the
    /// accepted gap between `total_duration` and the sum of scene durations.
    pub fn validate(&self, tolerance_secs: f64) -> Result<Vec<String>, ScriptError> {
        for (field, value) in [("id", &self.id), ("topic", &self.topic), ("title", &self.title)] {
            if value.trim().is_empty() {
                return Err(ScriptError::invalid(format!("'{field}' must not be empty")));
            }
        }
        if !self.total_duration.is_finite() || self.total_duration <= 0.0 {
            return Err(ScriptError::invalid(format!(
                "total_duration must be positive, got {}",
                self.total_duration
            )));
        }
        if self.scenes.is_empty() {
            return Err(ScriptError::invalid("script has no scenes"));
        }

        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        for (index, scene) in self.scenes.iter().enumerate() {
            if scene.id.trim().is_empty() {
                return Err(ScriptError::invalid(format!("scene #{index} has no id")));
            }
            if !scene.duration.is_finite() || scene.duration <= 0.0 {
                return Err(ScriptError::invalid(format!(
                    "scene '{}' duration must be positive, got {}",
                    scene.id, scene.duration
                )));
            }
            if let Some(source) = scene.kind.source() {
                if source.trim().is_empty() {
                    return Err(ScriptError::invalid(format!(
                        "{} scene '{}' has no source",
                        scene.kind.type_name(),
                        scene.id
                    )));
                }
            }
            if !seen.insert(scene.id.as_str()) {
                warnings.push(format!("duplicate scene id '{}'", scene.id));
            }
            if scene.transition_duration > scene.duration {
                warnings.push(format!(
                    "scene '{}' transition ({:.2}s) is longer than the scene ({:.2}s)",
                    scene.id, scene.transition_duration, scene.duration
                ));
            }
        }

        let sum = self.scenes_duration();
        if (sum - self.total_duration).abs() > tolerance_secs {
            warnings.push(format!(
                "scene durations sum to {sum:.3}s but total_duration is {:.3}s",
                self.total_duration
            ));
        }

        for (index, track) in self.audio_tracks.iter().enumerate() {
            if track.url.trim().is_empty() {
                return Err(ScriptError::invalid(format!(
                    "audio track #{index} has no url"
                )));
            }
            if !(0.0..=1.0).contains(&track.volume) {
                warnings.push(format!(
                    "{} volume {} clamped to {}",
                    track.label(index),
                    track.volume,
                    track.effective_volume()
                ));
            }
        }

        Ok(warnings)
    }
}

/// Errors that can occur when loading or validating scripts.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse script: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid script: {message}")]
    ValidationError { message: String },

    #[error("Caption #{index} is malformed: {message}")]
    CaptionError { index: usize, message: String },
}

impl ScriptError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::ValidationError {
            message: msg.into(),
        }
    }

    pub fn caption(index: usize, msg: impl Into<String>) -> Self {
        Self::CaptionError {
            index,
            message: msg.into(),
        }
    }
}

impl From<ScriptError> for ReelError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::IoError { source, .. } => ReelError::Io(source),
            ScriptError::ParseError(e) => ReelError::invalid_script(e.to_string()),
            ScriptError::ValidationError { message } => ReelError::invalid_script(message),
            ScriptError::CaptionError { index, message } => ReelError::caption(index, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r##"{
            "id": "script_20240101_120000",
            "topic": "Rust",
            "title": "Why Rust",
            "total_duration": 8.0,
            "scenes": [
                {"id": "scene_1", "duration": 3.0, "type": "text", "content": "Hook", "transition": "fade", "transition_duration": 0.5},
                {"id": "scene_2", "duration": 3.0, "type": "image", "url": "file:///tmp/a.png"},
                {"id": "scene_3", "duration": 2.0, "type": "video", "content": "clips/b.mp4"}
            ],
            "captions": [
                {"text": "Hello", "start_time": 0.0, "end_time": 3.0, "style": {"font_size": 48, "font_color": "#FFFFFF", "background_color": "#000000AA", "position": "bottom"}}
            ],
            "audio_tracks": [
                {"type": "music", "url": "music.mp3", "start_time": 0.0, "volume": 0.3, "fade_in": 1.0, "fade_out": 2.0}
            ],
            "metadata": {"hashtags": ["rust"], "target_platforms": ["TikTok", "youtube"]}
        }"##
    }

    #[test]
    fn test_parse_scene_variants() {
        let script = Script::from_json(sample_json()).unwrap();
        assert_eq!(script.scenes.len(), 3);
        assert_eq!(
            script.scenes[0].kind,
            SceneKind::Text {
                content: "Hook".to_string()
            }
        );
        assert_eq!(script.scenes[1].kind.source(), Some("file:///tmp/a.png"));
        assert_eq!(script.scenes[2].kind.type_name(), "video");
        assert_eq!(script.audio_tracks[0].kind, AudioKind::Music);
    }

    #[test]
    fn test_validate_accepts_sample() {
        let script = Script::from_json(sample_json()).unwrap();
        let warnings = script.validate(1.0 / 30.0).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(script.target_platforms(), vec!["tiktok", "youtube"]);
    }

    #[test]
    fn test_missing_required_field_is_parse_error() {
        let err = Script::from_json(r#"{"id": "x", "topic": "t", "title": "t", "scenes": []}"#)
            .unwrap_err();
        assert!(matches!(err, ScriptError::ParseError(_)));
    }

    #[test]
    fn test_duration_mismatch_is_warning() {
        let mut script = Script::from_json(sample_json()).unwrap();
        script.total_duration = 9.0;
        let warnings = script.validate(1.0 / 30.0).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("total_duration"));
    }

    #[test]
    fn test_non_positive_scene_duration_is_error() {
        let mut script = Script::from_json(sample_json()).unwrap();
        script.scenes[1].duration = 0.0;
        let err = script.validate(0.1).unwrap_err();
        assert!(err.to_string().contains("scene_2"));
    }

    #[test]
    fn test_empty_scenes_is_error() {
        let mut script = Script::from_json(sample_json()).unwrap();
        script.scenes.clear();
        assert!(script.validate(0.1).is_err());
    }

    #[test]
    fn test_volume_out_of_range_warns_and_clamps() {
        let mut script = Script::from_json(sample_json()).unwrap();
        script.audio_tracks[0].volume = 1.5;
        let warnings = script.validate(0.1).unwrap();
        assert!(warnings.iter().any(|w| w.contains("clamped")));
        assert!((script.audio_tracks[0].effective_volume() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_caption_timing_checks_structure() {
        let caption = Caption {
            text: Some("  ".to_string()),
            start_time: Some(0.0),
            end_time: Some(1.0),
            ..Caption::default()
        };
        assert!(matches!(
            caption.timing(2),
            Err(ScriptError::CaptionError { index: 2, .. })
        ));

        let caption = Caption {
            text: Some("Hi".to_string()),
            start_time: None,
            end_time: Some(1.0),
            ..Caption::default()
        };
        let err = caption.timing(0).unwrap_err();
        assert!(err.to_string().contains("start_time"));
    }

    #[test]
    fn test_transition_interpretation() {
        let script = Script::from_json(sample_json()).unwrap();
        assert_eq!(
            script.scenes[0].transition(),
            Ok(Transition::FadeIn { duration: 0.5 })
        );
        assert_eq!(script.scenes[1].transition(), Ok(Transition::Cut));

        let mut scene = script.scenes[0].clone();
        scene.transition = Some("wipe".to_string());
        assert_eq!(scene.transition(), Err("wipe".to_string()));
    }

    #[test]
    fn test_script_error_maps_into_reel_error() {
        let err: ReelError = ScriptError::caption(1, "missing text").into();
        assert_eq!(err.stage(), "captions");
        let err: ReelError = ScriptError::invalid("no scenes").into();
        assert_eq!(err.stage(), "validation");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(&path, sample_json()).unwrap();
        let script = Script::load(&path).unwrap();
        assert_eq!(script.title, "Why Rust");

        let missing = Script::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, ScriptError::IoError { .. }));
    }
}
