//! Metadata emitter: describes a finished video file.

use std::path::Path;

use shortreel_common::clock::JobClock;
use shortreel_common::error::{ReelError, ReelResult};
use shortreel_script_model::{Script, VideoArtifact};
use tokio_util::sync::CancellationToken;

use crate::ffmpeg::{FfmpegTool, MediaInfo};

/// Build the artifact descriptor from probe results. Pure.
pub fn build_artifact(
    script: &Script,
    info: &MediaInfo,
    file_size: u64,
    output_url: String,
    clock: &JobClock,
) -> ReelResult<VideoArtifact> {
    let video = info
        .video
        .as_ref()
        .ok_or_else(|| ReelError::metadata("final output has no video stream"))?;
    let duration = info
        .best_duration()
        .ok_or_else(|| ReelError::metadata("final output has no measurable duration"))?;

    Ok(VideoArtifact {
        id: format!("video_{}_{}", clock.stamp(), clock.tag()),
        script_id: script.id.clone(),
        topic: script.topic.clone(),
        title: script.title.clone(),
        duration,
        width: video.width,
        height: video.height,
        fps: (video.fps * 1000.0).round() / 1000.0,
        file_size,
        codec: video.codec.clone(),
        audio_codec: info.audio.as_ref().map(|a| a.codec.clone()),
        has_audio: info.audio.is_some(),
        output_url,
        created_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Probe `path` and describe it. Reads only; the file is not modified.
pub async fn describe_output(
    tool: &FfmpegTool,
    script: &Script,
    path: &Path,
    output_url: String,
    clock: &JobClock,
    cancel: &CancellationToken,
) -> ReelResult<VideoArtifact> {
    let info = tool
        .probe(path, cancel)
        .await
        .map_err(|e| e.into_stage(ReelError::metadata))?;
    let file_size = tokio::fs::metadata(path)
        .await
        .map_err(|e| ReelError::metadata(format!("cannot stat {}: {e}", path.display())))?
        .len();
    build_artifact(script, &info, file_size, output_url, clock)
}

/// `file://` URL of a path, made absolute against the working directory.
pub fn file_url(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let text = absolute.to_string_lossy().replace('\\', "/");
    if text.starts_with('/') {
        format!("file://{text}")
    } else {
        format!("file:///{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::{AudioStreamInfo, VideoStreamInfo};

    fn script() -> Script {
        Script::from_json(
            r#"{"id": "script_1", "topic": "Rust", "title": "Why Rust", "total_duration": 8.0,
                "scenes": [{"id": "s1", "duration": 8.0, "type": "text", "content": "hi"}]}"#,
        )
        .unwrap()
    }

    fn info(with_audio: bool) -> MediaInfo {
        MediaInfo {
            format_name: Some("mov,mp4".to_string()),
            duration: Some(8.0),
            video: Some(VideoStreamInfo {
                codec: "h264".to_string(),
                profile: None,
                width: 1080,
                height: 1920,
                fps: 30.0,
                pix_fmt: Some("yuv420p".to_string()),
                sample_aspect_ratio: None,
                time_base: None,
                duration: Some(8.0),
            }),
            audio: with_audio.then(|| AudioStreamInfo {
                codec: "aac".to_string(),
                sample_rate: Some(48000),
                channels: Some(2),
                duration: Some(8.0),
            }),
        }
    }

    #[test]
    fn test_artifact_from_probe() {
        let clock = JobClock::start();
        let artifact = build_artifact(
            &script(),
            &info(true),
            4096,
            "file:///out/a.mp4".to_string(),
            &clock,
        )
        .unwrap();
        assert_eq!(artifact.script_id, "script_1");
        assert_eq!(artifact.title, "Why Rust");
        assert_eq!((artifact.width, artifact.height), (1080, 1920));
        assert_eq!(artifact.codec, "h264");
        assert_eq!(artifact.audio_codec.as_deref(), Some("aac"));
        assert_eq!(artifact.file_size, 4096);
        assert!(artifact.id.starts_with("video_"));
        assert!(artifact.id.ends_with(clock.tag()));
    }

    #[test]
    fn test_same_second_jobs_get_distinct_ids() {
        let ids: std::collections::HashSet<String> = (0..8)
            .map(|_| {
                build_artifact(&script(), &info(true), 1, String::new(), &JobClock::start())
                    .unwrap()
                    .id
            })
            .collect();
        assert!(ids.len() > 1);
    }

    #[test]
    fn test_silent_output_marks_no_audio() {
        let artifact = build_artifact(
            &script(),
            &info(false),
            1,
            "file:///x.mp4".to_string(),
            &JobClock::start(),
        )
        .unwrap();
        assert!(!artifact.has_audio);
        assert!(artifact.audio_codec.is_none());
    }

    #[test]
    fn test_missing_video_stream_is_error() {
        let mut probe = info(true);
        probe.video = None;
        let err = build_artifact(&script(), &probe, 1, String::new(), &JobClock::start()).unwrap_err();
        assert_eq!(err.stage(), "metadata");
    }

    #[tokio::test]
    async fn test_probe_failure_reports_metadata_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final.mp4");
        std::fs::write(&path, b"not a video").unwrap();
        let tool = FfmpegTool::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let err = describe_output(
            &tool,
            &script(),
            &path,
            file_url(&path),
            &JobClock::start(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.stage(), "metadata");
        assert!(!err.to_string().contains("Media tool error"), "{err}");
    }

    #[test]
    fn test_file_url() {
        assert_eq!(file_url(Path::new("/tmp/out.mp4")), "file:///tmp/out.mp4");
        assert!(file_url(Path::new("out.mp4")).starts_with("file:///"));
    }
}
