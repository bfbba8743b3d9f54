//! Assembly job orchestration.
//!
//! One job runs render, concat, captions, audio, and metadata in order. Only
//! scene rendering fans out, through a bounded ordered pool. The job's
//! workspace is closed on every exit path, and the output file appears only
//! after every stage has succeeded.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt, TryStreamExt};
use shortreel_common::clock::{frame_interval_secs, JobClock};
use shortreel_common::config::AppConfig;
use shortreel_common::error::{ReelError, ReelResult};
use shortreel_script_model::{check_platforms, Script, VideoArtifact};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::audio::{decode_track, mix_tracks, mux_video_only, mux_with_audio, DecodedTrack};
use crate::captions::burn_captions;
use crate::concat::concatenate;
use crate::fetch::{fetch_into, AssetFetcher};
use crate::ffmpeg::FfmpegTool;
use crate::fonts::{resolve_font, FontChoice};
use crate::metadata::{describe_output, file_url};
use crate::scene::{scene_frame_counts, Clip, SceneRenderer};
use crate::workspace::{sanitize_component, JobWorkspace};

/// Progress callback for assembly jobs.
pub type ProgressCallback = Box<dyn Fn(AssemblyProgress) + Send + Sync>;

/// Progress report.
#[derive(Debug, Clone)]
pub struct AssemblyProgress {
    /// Current stage.
    pub stage: AssemblyStage,

    /// Overall progress [0.0, 1.0].
    pub progress: f64,

    /// Scenes rendered so far.
    pub scenes_rendered: usize,

    /// Total scenes in the script.
    pub scenes_total: usize,
}

/// Stages of an assembly job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStage {
    Preparing,
    RenderingScenes,
    Concatenating,
    Captioning,
    MixingAudio,
    Finalizing,
    Complete,
    Failed,
}

impl AssemblyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::RenderingScenes => "rendering_scenes",
            Self::Concatenating => "concatenating",
            Self::Captioning => "captioning",
            Self::MixingAudio => "mixing_audio",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Overall progress when the stage starts.
    fn base_progress(&self) -> f64 {
        match self {
            Self::Preparing | Self::Failed => 0.0,
            Self::RenderingScenes => 0.05,
            Self::Concatenating => 0.65,
            Self::Captioning => 0.75,
            Self::MixingAudio => 0.85,
            Self::Finalizing => 0.95,
            Self::Complete => 1.0,
        }
    }
}

impl std::fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall time spent in one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageTiming {
    pub stage: AssemblyStage,
    pub elapsed: Duration,
}

/// Outcome of a successful job.
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub job_id: String,
    pub artifact: VideoArtifact,
    /// Every non-fatal problem found along the way.
    pub warnings: Vec<String>,
    pub stage_timings: Vec<StageTiming>,
}

/// Turns scripts into finished videos.
///
/// The engine holds only read-only configuration, so one instance can run
/// any number of jobs concurrently.
pub struct AssemblyEngine {
    config: Arc<AppConfig>,
    tool: FfmpegTool,
    fetcher: Arc<dyn AssetFetcher>,
}

impl AssemblyEngine {
    pub fn new(config: Arc<AppConfig>, fetcher: Arc<dyn AssetFetcher>) -> Self {
        let tool = FfmpegTool::from_config(&config.render);
        Self {
            config,
            tool,
            fetcher,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tool(&self) -> &FfmpegTool {
        &self.tool
    }

    /// Assemble `script` into a video at `output_path`.
    ///
    /// On failure or cancellation no file is written to `output_path` and the
    /// job's workspace has been removed by the time this returns.
    pub async fn assemble(
        &self,
        script: &Script,
        output_path: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> ReelResult<AssemblyReport> {
        let clock = JobClock::start();
        let job_id = job_id_for(script, &clock);
        let span = tracing::info_span!("job", job_id = %job_id, script_id = %script.id);

        self.assemble_job(script, output_path, &job_id, &clock, cancel, progress)
            .instrument(span)
            .await
    }

    async fn assemble_job(
        &self,
        script: &Script,
        output_path: &Path,
        job_id: &str,
        clock: &JobClock,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> ReelResult<AssemblyReport> {
        tracing::info!(
            scenes = script.scenes.len(),
            captions = script.captions.len(),
            audio_tracks = script.audio_tracks.len(),
            output = %output_path.display(),
            "Starting assembly"
        );
        emit(progress, AssemblyStage::Preparing, 0, script.scenes.len());

        let tolerance = frame_interval_secs(self.config.video.fps);
        let warnings = script.validate(tolerance).map_err(ReelError::from)?;
        for warning in &warnings {
            tracing::warn!(stage = "validation", "{warning}");
        }

        let workspace = JobWorkspace::create(&self.config.temp_root(), job_id)?;
        let mut job = Job {
            engine: self,
            script,
            workspace: &workspace,
            cancel,
            progress,
            warnings,
            timings: Vec::new(),
        };

        let result = job.run(output_path, clock).await;
        let Job {
            mut warnings,
            timings,
            ..
        } = job;
        let cleanup = workspace.close();

        match result {
            Ok(artifact) => {
                if let Err(e) = cleanup {
                    let msg = format!("job workspace could not be fully removed: {e}");
                    tracing::warn!("{msg}");
                    warnings.push(msg);
                }
                emit(progress, AssemblyStage::Complete, script.scenes.len(), script.scenes.len());
                tracing::info!(
                    artifact_id = %artifact.id,
                    duration_secs = artifact.duration,
                    file_size = artifact.file_size,
                    warnings = warnings.len(),
                    elapsed_secs = clock.elapsed_secs(),
                    "Assembly complete"
                );
                Ok(AssemblyReport {
                    job_id: job_id.to_string(),
                    artifact,
                    warnings,
                    stage_timings: timings,
                })
            }
            Err(e) => {
                if let Err(cleanup_err) = cleanup {
                    tracing::error!(error = %cleanup_err, "Failed to remove job workspace");
                }
                emit(progress, AssemblyStage::Failed, 0, script.scenes.len());
                tracing::error!(stage = e.stage(), error = %e, "Assembly failed");
                Err(e)
            }
        }
    }
}

/// Job id: sanitized script id, start stamp, and the clock's random tag.
pub fn job_id_for(script: &Script, clock: &JobClock) -> String {
    format!(
        "job_{}_{}_{}",
        sanitize_component(&script.id),
        clock.stamp(),
        clock.tag()
    )
}

fn emit(
    progress: Option<&ProgressCallback>,
    stage: AssemblyStage,
    scenes_rendered: usize,
    scenes_total: usize,
) {
    let Some(cb) = progress else {
        return;
    };
    let mut fraction = stage.base_progress();
    if stage == AssemblyStage::RenderingScenes && scenes_total > 0 {
        let span = AssemblyStage::Concatenating.base_progress() - fraction;
        fraction += span * scenes_rendered as f64 / scenes_total as f64;
    }
    cb(AssemblyProgress {
        stage,
        progress: fraction,
        scenes_rendered,
        scenes_total,
    });
}

/// State of one running job.
struct Job<'a> {
    engine: &'a AssemblyEngine,
    script: &'a Script,
    workspace: &'a JobWorkspace,
    cancel: &'a CancellationToken,
    progress: Option<&'a ProgressCallback>,
    warnings: Vec<String>,
    timings: Vec<StageTiming>,
}

impl<'a> Job<'a> {
    async fn run(&mut self, output_path: &Path, clock: &JobClock) -> ReelResult<VideoArtifact> {
        self.check_cancelled()?;
        let engine = self.engine;
        let video = &engine.config.video;

        let font = resolve_font(&engine.config.fonts);
        if let Some(warning) = font.warning {
            self.warnings.push(warning);
        }

        let started = self.begin(AssemblyStage::RenderingScenes);
        let clips = self.render_scenes(&font.choice).await?;
        self.finish(AssemblyStage::RenderingScenes, started);

        let started = self.begin(AssemblyStage::Concatenating);
        let timeline = concatenate(&engine.tool, self.workspace, &clips, video, self.cancel).await?;
        self.warnings.extend(timeline.warnings.iter().cloned());
        let timeline_duration = timeline.duration();
        self.finish(AssemblyStage::Concatenating, started);

        let started = self.begin(AssemblyStage::Captioning);
        let captioned = burn_captions(
            &engine.tool,
            self.workspace,
            &timeline.clip,
            timeline_duration,
            &self.script.captions,
            &font.choice,
            video,
            self.cancel,
        )
        .await?;
        self.warnings.extend(captioned.warnings);
        self.finish(AssemblyStage::Captioning, started);

        let started = self.begin(AssemblyStage::MixingAudio);
        let staged = self.workspace.file("final.mp4");
        self.mix_audio(&captioned.clip, timeline_duration, &staged)
            .await?;
        self.finish(AssemblyStage::MixingAudio, started);

        let started = self.begin(AssemblyStage::Finalizing);
        self.check_cancelled()?;
        let artifact = describe_output(
            &engine.tool,
            self.script,
            &staged,
            file_url(output_path),
            clock,
            self.cancel,
        )
        .await?;
        self.check_cancelled()?;
        self.workspace.commit(&staged, output_path)?;

        let platform_warnings = check_platforms(
            &self.script.target_platforms(),
            artifact.duration,
            Some(artifact.file_size),
        );
        for warning in platform_warnings {
            tracing::warn!(stage = "platform", "{warning}");
            self.warnings.push(warning);
        }
        self.finish(AssemblyStage::Finalizing, started);

        Ok(artifact)
    }

    /// Render every scene through a bounded pool. Results come back in
    /// script order; the first failure drops (and so kills) the rest.
    async fn render_scenes(&mut self, font: &FontChoice) -> ReelResult<Vec<Clip>> {
        let engine = self.engine;
        let cancel = self.cancel;
        let script = self.script;
        let workspace = self.workspace;
        let scenes = &script.scenes;
        let total = scenes.len();

        let durations: Vec<f64> = scenes.iter().map(|s| s.duration).collect();
        let frame_counts = scene_frame_counts(&durations, engine.config.video.fps);
        let renderer = SceneRenderer::new(
            &engine.tool,
            &engine.config.video,
            &engine.config.render,
            font,
            engine.fetcher.as_ref(),
            workspace,
        );
        let concurrency = engine.config.render.scene_concurrency();
        tracing::debug!(scenes = total, concurrency, "Rendering scenes");

        let mut rendered = stream::iter(scenes.iter().zip(frame_counts).enumerate())
            .map(|(index, (scene, frames))| renderer.render(index, scene, frames, cancel))
            .buffered(concurrency);

        let mut clips = Vec::with_capacity(total);
        while let Some(result) = rendered.next().await {
            let scene = result?;
            self.warnings.extend(scene.warnings);
            clips.push(scene.clip);
            emit(self.progress, AssemblyStage::RenderingScenes, clips.len(), total);
        }
        Ok(clips)
    }

    async fn mix_audio(&mut self, video_clip: &Clip, timeline_duration: f64, staged: &Path) -> ReelResult<()> {
        let engine = self.engine;
        let video = &engine.config.video;

        if self.script.audio_tracks.is_empty() {
            tracing::info!("No audio tracks; writing a video-only output");
            return mux_video_only(&engine.tool, video_clip.path(), staged, self.cancel).await;
        }

        let tracks = self.decode_tracks().await?;
        let mix = mix_tracks(&tracks, timeline_duration, video.audio_sample_rate);
        for warning in &mix.warnings {
            tracing::warn!(stage = "audio_mix", "{warning}");
        }
        self.warnings.extend(mix.warnings.iter().cloned());
        if mix.normalized {
            tracing::info!(clipped = mix.clipped_samples, "Mix clipped frequently; normalized to peak");
        }

        if mix.mixed_tracks == 0 {
            tracing::info!("Every audio track was omitted; writing a video-only output");
            return mux_video_only(&engine.tool, video_clip.path(), staged, self.cancel).await;
        }

        mux_with_audio(
            &engine.tool,
            video_clip.path(),
            &mix.samples,
            &self.workspace.file("mix.f32le"),
            staged,
            video,
            self.cancel,
        )
        .await?;
        tracing::info!(tracks = mix.mixed_tracks, "Audio mixed");
        Ok(())
    }

    async fn decode_tracks(&self) -> ReelResult<Vec<DecodedTrack>> {
        let engine = self.engine;
        let workspace = self.workspace;
        let cancel = self.cancel;
        let sample_rate = engine.config.video.audio_sample_rate;

        stream::iter(self.script.audio_tracks.iter().enumerate())
            .map(|(index, track)| async move {
                let label = track.label(index);
                let path = fetch_into(
                    engine.fetcher.as_ref(),
                    &track.url,
                    workspace,
                    &format!("audio_{index:03}"),
                )
                .await
                .map_err(|e| match e {
                    ReelError::Cancelled => e,
                    other => ReelError::audio_mix(&label, other.to_string()),
                })?;
                let samples = decode_track(&engine.tool, &path, &label, sample_rate, cancel).await?;
                Ok::<_, ReelError>(DecodedTrack {
                    label,
                    samples,
                    start_time: track.start_time,
                    volume: track.effective_volume(),
                    fade_in: track.fade_in,
                    fade_out: track.fade_out,
                })
            })
            .buffered(engine.config.render.scene_concurrency())
            .try_collect()
            .await
    }

    fn check_cancelled(&self) -> ReelResult<()> {
        if self.cancel.is_cancelled() {
            Err(ReelError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn begin(&self, stage: AssemblyStage) -> Instant {
        tracing::debug!(stage = stage.as_str(), "Stage started");
        emit(self.progress, stage, 0, self.script.scenes.len());
        Instant::now()
    }

    fn finish(&mut self, stage: AssemblyStage, started: Instant) {
        let elapsed = started.elapsed();
        tracing::debug!(stage = stage.as_str(), elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
        self.timings.push(StageTiming { stage, elapsed });
    }
}
