//! Error types shared across Shortreel crates.

/// Top-level error type for Shortreel operations.
///
/// Stage variants carry enough context (scene id, caption index, track
/// label, URL) to diagnose a failed job from the message alone.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("Invalid script: {message}")]
    InvalidScript { message: String },

    #[error("Scene '{scene_id}' failed to render: {cause}")]
    SceneRender {
        scene_id: String,
        #[source]
        cause: Box<ReelError>,
    },

    #[error("Concatenation failed: {message}")]
    Concatenation { message: String },

    #[error("Caption #{index} is malformed: {message}")]
    Caption { index: usize, message: String },

    #[error("Caption burn-in failed: {message}")]
    CaptionBurn { message: String },

    #[error("Audio mix failed for {track}: {message}")]
    AudioMix { track: String, message: String },

    #[error("Failed to fetch asset '{url}': {message}")]
    AssetFetch { url: String, message: String },

    #[error("Media tool error: {message}")]
    Media { message: String },

    #[error("Could not describe output: {message}")]
    Metadata { message: String },

    #[error("Script source error: {message}")]
    ScriptSource { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Assembly job was cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

impl ReelError {
    pub fn invalid_script(msg: impl Into<String>) -> Self {
        Self::InvalidScript {
            message: msg.into(),
        }
    }

    pub fn scene_render(scene_id: impl Into<String>, cause: ReelError) -> Self {
        Self::SceneRender {
            scene_id: scene_id.into(),
            cause: Box::new(cause),
        }
    }

    pub fn concatenation(msg: impl Into<String>) -> Self {
        Self::Concatenation {
            message: msg.into(),
        }
    }

    pub fn caption(index: usize, msg: impl Into<String>) -> Self {
        Self::Caption {
            index,
            message: msg.into(),
        }
    }

    pub fn caption_burn(msg: impl Into<String>) -> Self {
        Self::CaptionBurn {
            message: msg.into(),
        }
    }

    pub fn audio_mix(track: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::AudioMix {
            track: track.into(),
            message: msg.into(),
        }
    }

    pub fn asset_fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::AssetFetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata {
            message: msg.into(),
        }
    }

    pub fn script_source(msg: impl Into<String>) -> Self {
        Self::ScriptSource {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Pipeline stage this error belongs to, for structured failure reports.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidScript { .. } => "validation",
            Self::SceneRender { .. } => "scene_render",
            Self::Concatenation { .. } => "concatenation",
            Self::Caption { .. } | Self::CaptionBurn { .. } => "captions",
            Self::AudioMix { .. } => "audio_mix",
            Self::AssetFetch { .. } => "asset_fetch",
            Self::Media { .. } => "media",
            Self::Metadata { .. } => "metadata",
            Self::ScriptSource { .. } => "script_source",
            Self::Config { .. } => "config",
            Self::Cancelled => "cancelled",
            Self::Io(_) | Self::Json(_) | Self::Other(_) => "internal",
        }
    }

    /// Unexpected faults that should surface as a server error rather than
    /// a structured `{success: false}` result.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Json(_) | Self::Other(_))
    }

    /// Walk through `SceneRender` wrappers to the underlying cause.
    pub fn root_cause(&self) -> &ReelError {
        match self {
            Self::SceneRender { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_render_keeps_fetch_cause() {
        let err = ReelError::scene_render(
            "scene_2",
            ReelError::asset_fetch("file:///missing.png", "not found"),
        );
        assert_eq!(err.stage(), "scene_render");
        assert!(matches!(err.root_cause(), ReelError::AssetFetch { .. }));
        let msg = err.to_string();
        assert!(msg.contains("scene_2"));
        assert!(msg.contains("missing.png"));
    }

    #[test]
    fn test_internal_classification() {
        let io = ReelError::from(std::io::Error::other("disk gone"));
        assert!(io.is_internal());
        assert!(!ReelError::concatenation("bad clip").is_internal());
        assert!(!ReelError::Cancelled.is_internal());
    }

    #[test]
    fn test_caption_error_names_index() {
        let err = ReelError::caption(3, "missing text");
        assert_eq!(err.to_string(), "Caption #3 is malformed: missing text");
        assert_eq!(err.stage(), "captions");
    }

    #[test]
    fn test_output_stage_errors_name_their_stage() {
        let burn = ReelError::caption_burn("ffmpeg exited with 1");
        assert_eq!(burn.stage(), "captions");
        assert_eq!(burn.to_string(), "Caption burn-in failed: ffmpeg exited with 1");
        let meta = ReelError::metadata("no video stream");
        assert_eq!(meta.stage(), "metadata");
        assert!(!meta.is_internal());
    }
}
