//! Clip concatenator.
//!
//! Joins rendered clips in order. When every clip shares the same stream
//! parameters the concat demuxer copies packets; otherwise all clips are
//! decoded and re-encoded through the concat filter.

use std::path::Path;

use shortreel_common::clock::{frame_interval_secs, DurationDrift};
use shortreel_common::config::VideoConfig;
use shortreel_common::error::{ReelError, ReelResult};
use tokio_util::sync::CancellationToken;

use crate::ffmpeg::{video_encode_args, FfmpegTool, ProcessError, VideoStreamInfo};
use crate::scene::Clip;
use crate::workspace::JobWorkspace;

/// How the clips will be joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatStrategy {
    StreamCopy,
    Reencode { reason: String },
}

/// The concatenated timeline.
#[derive(Debug)]
pub struct Timeline {
    pub clip: Clip,
    /// Duration measured on the output file, when it could be probed.
    pub measured_duration: Option<f64>,
    pub strategy: ConcatStrategy,
    pub warnings: Vec<String>,
}

impl Timeline {
    /// Duration used by later stages.
    pub fn duration(&self) -> f64 {
        self.measured_duration.unwrap_or_else(|| self.clip.duration())
    }
}

/// Concat demuxer list. Single quotes in paths are escaped as `'\''`.
pub fn concat_list_contents(paths: &[&Path]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// Stream copy only when every clip has an identical parameter signature.
pub fn choose_strategy(streams: &[VideoStreamInfo]) -> ConcatStrategy {
    let Some(first) = streams.first() else {
        return ConcatStrategy::StreamCopy;
    };
    let reference = first.concat_signature();
    match streams
        .iter()
        .enumerate()
        .find(|(_, s)| s.concat_signature() != reference)
    {
        None => ConcatStrategy::StreamCopy,
        Some((index, s)) => ConcatStrategy::Reencode {
            reason: format!(
                "clip #{index} has parameters [{}], expected [{}]",
                s.concat_signature(),
                reference
            ),
        },
    }
}

/// Join `clips` into one timeline, preserving order.
pub async fn concatenate(
    tool: &FfmpegTool,
    workspace: &JobWorkspace,
    clips: &[Clip],
    video: &VideoConfig,
    cancel: &CancellationToken,
) -> ReelResult<Timeline> {
    if clips.is_empty() {
        return Err(ReelError::concatenation("no clips to concatenate"));
    }

    let mut streams = Vec::with_capacity(clips.len());
    for (index, clip) in clips.iter().enumerate() {
        let info = tool.probe(clip.path(), cancel).await.map_err(|e| {
            stage_error(e, || format!("clip #{index} is unreadable"))
        })?;
        let stream = info.video.ok_or_else(|| {
            ReelError::concatenation(format!("clip #{index} has no video stream"))
        })?;
        streams.push(stream);
    }

    let expected_frames: u64 = clips.iter().map(Clip::frames).sum();
    let output = workspace.file("timeline.mp4");

    let strategy = if clips.len() == 1 {
        ConcatStrategy::StreamCopy
    } else {
        choose_strategy(&streams)
    };

    let result = if clips.len() == 1 {
        // A single clip already is the timeline.
        tokio::fs::copy(clips[0].path(), &output)
            .await
            .map(|_| ())
            .map_err(|e| ReelError::concatenation(format!("failed to copy clip: {e}")))
    } else {
        match &strategy {
            ConcatStrategy::StreamCopy => stream_copy(tool, workspace, clips, &output, cancel).await,
            ConcatStrategy::Reencode { reason } => {
                tracing::info!(reason = %reason, "Clip parameters differ; re-encoding timeline");
                reencode(tool, clips, video, &output, cancel).await
            }
        }
    };

    if let Err(e) = result {
        remove_partial(&output);
        return Err(e);
    }

    let clip = Clip::new(output.clone(), expected_frames, video);
    let mut warnings = Vec::new();
    let measured_duration = match tool.probe(&output, cancel).await {
        Ok(info) => info.best_duration(),
        Err(e) => {
            remove_partial(&output);
            return Err(stage_error(e, || "timeline is unreadable".to_string()));
        }
    };

    if let Some(actual) = measured_duration {
        let drift = DurationDrift {
            expected: clip.duration(),
            actual,
        };
        if drift.exceeds(frame_interval_secs(video.fps)) {
            let msg = format!(
                "concatenated timeline is {actual:.3}s, expected {:.3}s",
                clip.duration()
            );
            tracing::warn!(drift_ms = drift.drift_ms(), "{msg}");
            warnings.push(msg);
        }
    }

    tracing::info!(
        clips = clips.len(),
        strategy = ?strategy,
        duration_secs = clip.duration(),
        "Timeline concatenated"
    );

    Ok(Timeline {
        clip,
        measured_duration,
        strategy,
        warnings,
    })
}

async fn stream_copy(
    tool: &FfmpegTool,
    workspace: &JobWorkspace,
    clips: &[Clip],
    output: &Path,
    cancel: &CancellationToken,
) -> ReelResult<()> {
    let list_path = workspace.file("concat.txt");
    let paths: Vec<&Path> = clips.iter().map(Clip::path).collect();
    tokio::fs::write(&list_path, concat_list_contents(&paths)).await?;

    let args: Vec<String> = vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_path.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ];
    tool.run(&args, cancel)
        .await
        .map_err(|e| stage_error(e, || "stream copy failed".to_string()))?;
    Ok(())
}

async fn reencode(
    tool: &FfmpegTool,
    clips: &[Clip],
    video: &VideoConfig,
    output: &Path,
    cancel: &CancellationToken,
) -> ReelResult<()> {
    let mut args: Vec<String> = Vec::new();
    for clip in clips {
        args.push("-i".into());
        args.push(clip.path().to_string_lossy().into_owned());
    }

    let (w, h) = (video.width, video.height);
    let mut graph = String::new();
    for index in 0..clips.len() {
        graph.push_str(&format!(
            "[{index}:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={},format={}[v{index}];",
            video.fps, video.pixel_format
        ));
    }
    for index in 0..clips.len() {
        graph.push_str(&format!("[v{index}]"));
    }
    graph.push_str(&format!("concat=n={}:v=1:a=0[outv]", clips.len()));

    args.extend([
        "-filter_complex".to_string(),
        graph,
        "-map".to_string(),
        "[outv]".to_string(),
        "-an".to_string(),
    ]);
    args.extend(video_encode_args(video));
    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.to_string_lossy().into_owned(),
    ]);

    tool.run(&args, cancel)
        .await
        .map_err(|e| stage_error(e, || "re-encode failed".to_string()))?;
    Ok(())
}

/// Map a media failure into a concatenation error, keeping cancellation.
fn stage_error(err: ProcessError, context: impl FnOnce() -> String) -> ReelError {
    err.into_stage(|msg| ReelError::concatenation(format!("{}: {msg}", context())))
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial timeline");
        }
    }
}
