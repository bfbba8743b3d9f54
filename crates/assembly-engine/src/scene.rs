//! Scene renderer: one scene in, one fixed-length clip at the canonical
//! format out.
//!
//! Each scene variant only decides what the ffmpeg input is. The shared
//! encode step then fits it to the frame, applies the transition, and writes
//! exactly the number of frames the scene owns.

use std::path::{Path, PathBuf};

use shortreel_common::config::{RenderConfig, VideoConfig};
use shortreel_common::error::{ReelError, ReelResult};
use shortreel_script_model::{Rgba, Scene, SceneKind, Transition};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::fetch::{fetch_into, AssetFetcher};
use crate::ffmpeg::{quote_filter_value, video_encode_args, FfmpegTool};
use crate::fonts::FontChoice;
use crate::workspace::JobWorkspace;

/// An intermediate video segment owned by the job workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    path: PathBuf,
    frames: u64,
    fps: u32,
}

impl Clip {
    pub(crate) fn new(path: PathBuf, frames: u64, video: &VideoConfig) -> Self {
        Self {
            path,
            frames,
            fps: video.fps,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames as f64 / self.fps.max(1) as f64
    }
}

/// A rendered scene plus anything worth reporting about it.
#[derive(Debug)]
pub struct RenderedScene {
    pub clip: Clip,
    pub warnings: Vec<String>,
}

/// Frame count for each scene, taken from cumulative boundaries so that
/// rounding never accumulates across scenes. Every scene gets at least one frame.
pub fn scene_frame_counts(durations: &[f64], fps: u32) -> Vec<u64> {
    let fps = fps.max(1) as f64;
    let mut counts = Vec::with_capacity(durations.len());
    let mut elapsed = 0.0;
    let mut emitted: u64 = 0;
    for duration in durations {
        elapsed += duration.max(0.0);
        let boundary = (elapsed * fps).round() as u64;
        let frames = boundary.saturating_sub(emitted).max(1);
        emitted += frames;
        counts.push(frames);
    }
    counts
}

/// Greedy word wrap. Words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> String {
    let max = max_chars.max(1);
    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_len = 0usize;
        for word in paragraph.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(max) {
                if line_len == 0 {
                    line = chunk.iter().collect();
                    line_len = chunk.len();
                } else if line_len + 1 + chunk.len() <= max {
                    line.push(' ');
                    line.extend(chunk.iter());
                    line_len += 1 + chunk.len();
                } else {
                    lines.push(std::mem::take(&mut line));
                    line = chunk.iter().collect();
                    line_len = chunk.len();
                }
            }
        }
        if line_len > 0 {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Approximate characters per line for a centered text block.
pub fn max_chars_per_line(width: u32, font_size: u32) -> usize {
    let usable = width as f64 * 0.85;
    let glyph = font_size.max(1) as f64 * 0.55;
    (usable / glyph).floor().max(1.0) as usize
}

/// ffmpeg input for the shared encode step.
struct SceneInput {
    args: Vec<String>,
}

impl SceneInput {
    /// A still image repeated at the output frame rate.
    fn still(path: &Path, fps: u32) -> Self {
        Self {
            args: vec![
                "-loop".to_string(),
                "1".to_string(),
                "-framerate".to_string(),
                fps.to_string(),
                "-i".to_string(),
                path.to_string_lossy().into_owned(),
            ],
        }
    }

    /// A video looped indefinitely; the encode step cuts it.
    fn looped_video(path: &Path) -> Self {
        Self {
            args: vec![
                "-stream_loop".to_string(),
                "-1".to_string(),
                "-i".to_string(),
                path.to_string_lossy().into_owned(),
            ],
        }
    }
}

/// Renders scenes into clips inside one job workspace.
pub struct SceneRenderer<'a> {
    tool: &'a FfmpegTool,
    video: &'a VideoConfig,
    render: &'a RenderConfig,
    font: &'a FontChoice,
    fetcher: &'a dyn AssetFetcher,
    workspace: &'a JobWorkspace,
}

impl<'a> SceneRenderer<'a> {
    pub fn new(
        tool: &'a FfmpegTool,
        video: &'a VideoConfig,
        render: &'a RenderConfig,
        font: &'a FontChoice,
        fetcher: &'a dyn AssetFetcher,
        workspace: &'a JobWorkspace,
    ) -> Self {
        Self {
            tool,
            video,
            render,
            font,
            fetcher,
            workspace,
        }
    }

    /// Render scene `index` into exactly `frames` frames.
    ///
    /// Any failure is reported as a scene render error naming the scene;
    /// cancellation passes through unchanged.
    pub async fn render(
        &self,
        index: usize,
        scene: &Scene,
        frames: u64,
        cancel: &CancellationToken,
    ) -> ReelResult<RenderedScene> {
        let span = tracing::info_span!("scene", scene_id = %scene.id, index);
        self.render_inner(index, scene, frames, cancel)
            .instrument(span)
            .await
            .map_err(|e| match e {
                ReelError::Cancelled => e,
                other => ReelError::scene_render(&scene.id, other),
            })
    }

    async fn render_inner(
        &self,
        index: usize,
        scene: &Scene,
        frames: u64,
        cancel: &CancellationToken,
    ) -> ReelResult<RenderedScene> {
        let mut warnings = Vec::new();

        let input = match &scene.kind {
            SceneKind::Text { content } => {
                self.prepare_text(index, content, &mut warnings, cancel)
                    .await?
            }
            SceneKind::Image { source } => {
                let path = fetch_into(
                    self.fetcher,
                    source,
                    self.workspace,
                    &format!("scene_{index:03}_source"),
                )
                .await?;
                SceneInput::still(&path, self.video.fps)
            }
            SceneKind::Video { source } => {
                let path = fetch_into(
                    self.fetcher,
                    source,
                    self.workspace,
                    &format!("scene_{index:03}_source"),
                )
                .await?;
                let info = self.tool.probe(&path, cancel).await?;
                if info.video.is_none() {
                    return Err(ReelError::media(format!(
                        "'{source}' has no decodable video stream"
                    )));
                }
                if let Some(src_duration) = info.best_duration() {
                    tracing::debug!(
                        scene_id = %scene.id,
                        source_secs = src_duration,
                        target_secs = scene.duration,
                        looped = src_duration < scene.duration,
                        "Fitting video source to scene duration"
                    );
                }
                SceneInput::looped_video(&path)
            }
        };

        let transition = scene.transition().unwrap_or_else(|name| {
            warnings.push(format!(
                "scene '{}': unknown transition '{name}', using a cut",
                scene.id
            ));
            Transition::Cut
        });

        let output = self.workspace.scene_clip_path(index);
        let mut args = input.args;
        args.push("-vf".to_string());
        args.push(self.fit_filter(transition));
        args.extend(["-frames:v".to_string(), frames.to_string(), "-an".to_string()]);
        args.extend(video_encode_args(self.video));
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        args.push(output.to_string_lossy().into_owned());

        self.tool.run(&args, cancel).await?;

        tracing::info!(
            scene_id = %scene.id,
            kind = scene.kind.type_name(),
            frames,
            "Scene rendered"
        );
        for warning in &warnings {
            tracing::warn!(scene_id = %scene.id, "{warning}");
        }

        Ok(RenderedScene {
            clip: Clip::new(output, frames, self.video),
            warnings,
        })
    }

    /// Center-crop to fill the canonical frame, normalize rate/format, and
    /// apply the fade-in if any.
    fn fit_filter(&self, transition: Transition) -> String {
        let (w, h) = (self.video.width, self.video.height);
        let mut filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={},format={}",
            self.video.fps, self.video.pixel_format
        );
        if let Transition::FadeIn { duration } = transition {
            filter.push_str(&format!(",fade=t=in:st=0:d={duration:.3}"));
        }
        filter
    }

    /// Draw the scene text onto a solid canvas and save it as a still.
    async fn prepare_text(
        &self,
        index: usize,
        content: &str,
        warnings: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> ReelResult<SceneInput> {
        let (w, h) = (self.video.width, self.video.height);
        let font_size = self.render.text_font_size;

        let text_path = self.workspace.file(&format!("scene_{index:03}_text.txt"));
        let wrapped = wrap_text(content, max_chars_per_line(w, font_size));
        tokio::fs::write(&text_path, wrapped).await?;

        let background = config_color(
            &self.render.text_background,
            Rgba::opaque(0x1a, 0x1a, 0x1a),
            "text_background",
            warnings,
        );
        let foreground = config_color(&self.render.text_color, Rgba::WHITE, "text_color", warnings);

        let drawtext = format!(
            "drawtext={font}:textfile={file}:expansion=none:fontsize={font_size}:fontcolor={fg}:line_spacing={spacing}:x=(w-text_w)/2:y=(h-text_h)/2",
            font = self.font.drawtext_option(),
            file = quote_filter_value(&text_path.to_string_lossy()),
            fg = foreground.to_ffmpeg(),
            spacing = font_size / 4,
        );

        let still = self.workspace.file(&format!("scene_{index:03}_still.png"));
        let args = vec![
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!("color=c={}:s={w}x{h}:d=1", background.to_ffmpeg()),
            "-vf".to_string(),
            drawtext,
            "-frames:v".to_string(),
            "1".to_string(),
            still.to_string_lossy().into_owned(),
        ];
        self.tool.run(&args, cancel).await?;

        Ok(SceneInput::still(&still, self.video.fps))
    }
}

fn config_color(raw: &str, fallback: Rgba, field: &str, warnings: &mut Vec<String>) -> Rgba {
    Rgba::parse(raw).unwrap_or_else(|| {
        warnings.push(format!("invalid {field} '{raw}' in config; using default"));
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_counts_match_rounded_total() {
        let counts = scene_frame_counts(&[3.0, 3.0, 2.0], 30);
        assert_eq!(counts, vec![90, 90, 60]);

        let counts = scene_frame_counts(&[0.35, 0.35, 0.35], 30);
        assert_eq!(counts.iter().sum::<u64>(), 32);
    }

    #[test]
    fn test_tiny_scene_still_gets_a_frame() {
        let counts = scene_frame_counts(&[0.001, 2.0], 30);
        assert_eq!(counts[0], 1);
        assert_eq!(counts.iter().sum::<u64>(), 60);
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("one two three four", 9), "one two\nthree\nfour");
        assert_eq!(wrap_text("abcdefghij", 4), "abcd\nefgh\nij");
        assert_eq!(wrap_text("  spaced   out  ", 20), "spaced out");
        assert_eq!(wrap_text("line one\nline two", 20), "line one\nline two");
    }

    #[test]
    fn test_max_chars_per_line() {
        assert_eq!(max_chars_per_line(1080, 72), 23);
        assert_eq!(max_chars_per_line(10, 500), 1);
    }

    #[test]
    fn test_config_color_falls_back() {
        let mut warnings = Vec::new();
        let color = config_color("nope", Rgba::WHITE, "text_color", &mut warnings);
        assert_eq!(color, Rgba::WHITE);
        assert_eq!(warnings.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_frame_total_tracks_duration_sum(
            durations in proptest::collection::vec(0.05f64..20.0, 1..20),
            fps in prop_oneof![Just(24u32), Just(25), Just(30), Just(60)],
        ) {
            let counts = scene_frame_counts(&durations, fps);
            prop_assert_eq!(counts.len(), durations.len());
            prop_assert!(counts.iter().all(|c| *c >= 1));

            let total_secs = counts.iter().sum::<u64>() as f64 / fps as f64;
            let expected: f64 = durations.iter().sum();
            // A one-frame floor on very short scenes can add at most one frame each.
            let slack = (0.5 + durations.len() as f64) / fps as f64;
            prop_assert!((total_secs - expected).abs() <= slack);
        }

        #[test]
        fn prop_wrapped_lines_fit(text in "[a-z ]{0,200}", max in 1usize..40) {
            for line in wrap_text(&text, max).lines() {
                prop_assert!(line.chars().count() <= max);
            }
        }
    }
}
