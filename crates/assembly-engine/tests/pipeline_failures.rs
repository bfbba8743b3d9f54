//! Failure paths that need no working ffmpeg.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use shortreel_assembly_engine::{
    AssemblyEngine, AssemblyProgress, AssemblyStage, LocalAssetFetcher, ProgressCallback,
};
use shortreel_common::config::AppConfig;
use shortreel_common::error::ReelError;
use shortreel_script_model::Script;
use tokio_util::sync::CancellationToken;

fn engine(temp_root: &Path) -> AssemblyEngine {
    let mut config = AppConfig::default();
    config.temp_root = Some(temp_root.to_path_buf());
    AssemblyEngine::new(Arc::new(config), Arc::new(LocalAssetFetcher::new()))
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_missing_image_fails_scene_and_cleans_up() {
    let temp_root = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("reel.mp4");

    let script = Script::from_json(
        r#"{
            "id": "script_missing_asset",
            "topic": "t",
            "title": "Missing asset",
            "total_duration": 2.0,
            "scenes": [
                {"id": "broken", "duration": 2.0, "type": "image",
                 "content": "file:///nonexistent/shortreel/missing.png"}
            ]
        }"#,
    )
    .unwrap();

    let err = engine(temp_root.path())
        .assemble(&script, &output, &CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "scene_render");
    assert!(err.to_string().contains("broken"));
    assert!(matches!(err.root_cause(), ReelError::AssetFetch { .. }));
    assert!(!output.exists());
    assert!(is_empty_dir(temp_root.path()));
}

#[tokio::test]
async fn test_invalid_script_rejected_before_workspace() {
    let temp_root = tempfile::tempdir().unwrap();
    let output = temp_root.path().join("never.mp4");

    let script = Script::from_json(
        r#"{"id": "s", "topic": "t", "title": "t", "total_duration": 1.0, "scenes": []}"#,
    )
    .unwrap();

    let err = engine(temp_root.path())
        .assemble(&script, &output, &CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "validation");
    assert!(is_empty_dir(temp_root.path()));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let temp_root = tempfile::tempdir().unwrap();
    let output = temp_root.path().join("cancelled.mp4");

    let script = Script::from_json(
        r#"{"id": "s", "topic": "t", "title": "t", "total_duration": 1.0,
            "scenes": [{"id": "a", "duration": 1.0, "type": "text", "content": "hello"}]}"#,
    )
    .unwrap();

    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = stages.clone();
    let progress: ProgressCallback = Box::new(move |p: AssemblyProgress| {
        sink.lock().unwrap().push(p.stage);
    });

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine(temp_root.path())
        .assemble(&script, &output, &cancel, Some(&progress))
        .await
        .unwrap_err();

    assert!(matches!(err, ReelError::Cancelled));
    assert!(!output.exists());
    assert!(is_empty_dir(temp_root.path()));

    let stages = stages.lock().unwrap();
    assert_eq!(stages.first(), Some(&AssemblyStage::Preparing));
    assert_eq!(stages.last(), Some(&AssemblyStage::Failed));
}

/// A stand-in media tool that never finishes on its own.
#[cfg(unix)]
fn hanging_tool(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_during_encode_kills_tool_and_cleans_up() {
    let temp_root = tempfile::tempdir().unwrap();
    let bin_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("reel.mp4");

    let mut config = AppConfig::default();
    config.temp_root = Some(temp_root.path().to_path_buf());
    config.render.ffmpeg_path = hanging_tool(bin_dir.path());
    config.render.ffprobe_path = config.render.ffmpeg_path.clone();
    let engine = AssemblyEngine::new(Arc::new(config), Arc::new(LocalAssetFetcher::new()));

    let script = Script::from_json(
        r#"{"id": "s", "topic": "t", "title": "t", "total_duration": 2.0,
            "scenes": [{"id": "a", "duration": 2.0, "type": "text", "content": "hello"}]}"#,
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = engine
        .assemble(&script, &output, &cancel, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ReelError::Cancelled), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!output.exists());
    assert!(is_empty_dir(temp_root.path()));
}
