//! Descriptor of a finished video and the response envelope around it.

use serde::{Deserialize, Serialize};

/// Metadata for one rendered video. Created only after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoArtifact {
    /// Artifact id (`video_YYYYMMDD_HHMMSS`).
    pub id: String,
    pub script_id: String,
    pub topic: String,
    pub title: String,

    /// Measured duration of the output file (seconds).
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,

    /// Size of the output file in bytes.
    pub file_size: u64,

    /// Video codec identifier as reported by the container (e.g. `h264`).
    pub codec: String,

    /// Audio codec identifier; `None` marks a video-only output.
    pub audio_codec: Option<String>,
    pub has_audio: bool,

    /// `file://` URL of the output.
    pub output_url: String,

    /// RFC 3339 creation time.
    pub created_at: String,
}

/// Result envelope returned to callers: the artifact on success, an error
/// message naming the failing stage otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage that failed, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl GenerationResponse {
    pub fn ok(artifact: VideoArtifact, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            metadata: Some(artifact),
            error: None,
            stage: None,
            warnings,
        }
    }

    pub fn failed(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            metadata: None,
            error: Some(error.into()),
            stage: Some(stage.into()),
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> VideoArtifact {
        VideoArtifact {
            id: "video_20240101_120000".to_string(),
            script_id: "script_1".to_string(),
            topic: "Rust".to_string(),
            title: "Why Rust".to_string(),
            duration: 8.0,
            width: 1080,
            height: 1920,
            fps: 30.0,
            file_size: 1234,
            codec: "h264".to_string(),
            audio_codec: None,
            has_audio: false,
            output_url: "file:///tmp/out.mp4".to_string(),
            created_at: "2024-01-01T12:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_artifact_uses_camel_case() {
        let value = serde_json::to_value(artifact()).unwrap();
        assert_eq!(value["scriptId"], "script_1");
        assert_eq!(value["fileSize"], 1234);
        assert_eq!(value["outputUrl"], "file:///tmp/out.mp4");
        assert!(value["audioCodec"].is_null());
        assert_eq!(value["hasAudio"], false);
    }

    #[test]
    fn test_failure_envelope_shape() {
        let value =
            serde_json::to_value(GenerationResponse::failed("scene_render", "boom")).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
        assert_eq!(value["stage"], "scene_render");
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn test_success_envelope_carries_artifact() {
        let response = GenerationResponse::ok(artifact(), vec!["late caption dropped".into()]);
        let json = serde_json::to_string(&response).unwrap();
        let parsed: GenerationResponse = serde_json::from_str(&json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.metadata.unwrap().id, "video_20240101_120000");
        assert_eq!(parsed.warnings.len(), 1);
    }
}
