//! Caption compositor: burns timed captions onto the timeline.
//!
//! Planning is pure and separate from rendering. A caption with missing
//! text or times aborts the job; a caption outside the timeline or with an
//! unusable style is reported and degraded instead.

use std::collections::HashMap;
use std::path::PathBuf;

use shortreel_common::config::VideoConfig;
use shortreel_common::error::{ReelError, ReelResult};
use shortreel_script_model::{Caption, CaptionPosition, CaptionStyle};
use tokio_util::sync::CancellationToken;

use crate::ffmpeg::{quote_filter_value, video_encode_args, FfmpegTool};
use crate::fonts::FontChoice;
use crate::scene::{max_chars_per_line, wrap_text, Clip};
use crate::workspace::JobWorkspace;

/// A caption ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCaption {
    /// Index in the script's caption list.
    pub index: usize,
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub style: CaptionStyle,
    /// Stacking slot within its anchor; 0 is closest to the anchor.
    pub slot: usize,
}

impl PlannedCaption {
    fn overlaps(&self, other: &PlannedCaption) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Default)]
pub struct CaptionPlan {
    /// Surviving captions ordered by start time, then input order.
    pub captions: Vec<PlannedCaption>,
    pub warnings: Vec<String>,
}

/// Validate, clamp, style, and stack captions for a timeline of `duration` seconds.
pub fn plan_captions(captions: &[Caption], duration: f64) -> ReelResult<CaptionPlan> {
    let mut plan = CaptionPlan::default();

    for (index, caption) in captions.iter().enumerate() {
        let timing = caption.timing(index)?;

        let start = timing.start.max(0.0);
        let end = timing.end.min(duration);
        if end <= start {
            plan.warnings.push(format!(
                "caption #{index} [{:.3}s, {:.3}s) falls outside the {duration:.3}s timeline; dropped",
                timing.start, timing.end
            ));
            continue;
        }
        if start != timing.start || end != timing.end {
            plan.warnings.push(format!(
                "caption #{index} clamped from [{:.3}s, {:.3}s) to [{start:.3}s, {end:.3}s)",
                timing.start, timing.end
            ));
        }

        let (style, problems) = caption.style.resolve();
        if !problems.is_empty() {
            plan.warnings.push(format!(
                "caption #{index} style fallback: {}",
                problems.join(", ")
            ));
        }

        plan.captions.push(PlannedCaption {
            index,
            text: timing.text.to_string(),
            start,
            end,
            style,
            slot: 0,
        });
    }

    plan.captions.sort_by(|a, b| {
        a.start
            .total_cmp(&b.start)
            .then_with(|| a.index.cmp(&b.index))
    });
    assign_slots(&mut plan.captions);
    Ok(plan)
}

/// Give each caption the lowest slot not used by an earlier, overlapping
/// caption at the same anchor. Expects captions sorted by start.
fn assign_slots(captions: &mut [PlannedCaption]) {
    for i in 0..captions.len() {
        let (placed, rest) = captions.split_at_mut(i);
        let current = &mut rest[0];
        let taken: Vec<usize> = placed
            .iter()
            .filter(|p| p.style.position == current.style.position && p.overlaps(current))
            .map(|p| p.slot)
            .collect();
        current.slot = (0..).find(|slot| !taken.contains(slot)).unwrap_or(0);
    }
}

/// Pixel geometry used to lay captions out.
#[derive(Debug, Clone, Copy)]
struct Layout {
    margin: u32,
    padding: u32,
}

impl Layout {
    fn for_frame(height: u32) -> Self {
        Self {
            margin: (height as f64 * 0.08).round() as u32,
            padding: (height as f64 * 0.008).round().max(4.0) as u32,
        }
    }
}

fn line_height(font_size: u32) -> u32 {
    font_size + font_size / 4
}

/// Vertical distance between stacked slots at each anchor, sized for the
/// tallest caption drawn there.
fn slot_pitches(
    captions: &[(PlannedCaption, String)],
    layout: Layout,
) -> HashMap<CaptionPosition, u32> {
    let mut pitches: HashMap<CaptionPosition, u32> = HashMap::new();
    for (caption, wrapped) in captions {
        let lines = wrapped.lines().count().max(1) as u32;
        let block = lines * line_height(caption.style.font_size) + 2 * layout.padding;
        let gap = layout.padding * 2;
        let entry = pitches.entry(caption.style.position).or_insert(0);
        *entry = (*entry).max(block + gap);
    }
    pitches
}

fn y_expression(position: CaptionPosition, slot: u32, pitch: u32, layout: Layout) -> String {
    let offset = slot * pitch;
    match position {
        CaptionPosition::Top => format!("{}", layout.margin + layout.padding + offset),
        CaptionPosition::Center => format!("(h-text_h)/2+{offset}"),
        CaptionPosition::Bottom => {
            format!("h-text_h-{}", layout.margin + layout.padding + offset)
        }
    }
}

/// Build the `drawtext` chain. `text_files[i]` holds the wrapped text of
/// `captions[i]`.
fn drawtext_chain(
    captions: &[(PlannedCaption, String)],
    text_files: &[PathBuf],
    font: &FontChoice,
    frame_height: u32,
) -> String {
    let layout = Layout::for_frame(frame_height);
    let pitches = slot_pitches(captions, layout);

    captions
        .iter()
        .zip(text_files)
        .map(|((caption, _), file)| {
            let style = &caption.style;
            let pitch = pitches.get(&style.position).copied().unwrap_or(0);
            format!(
                "drawtext={font}:textfile={file}:expansion=none:fontsize={size}:fontcolor={fg}:box=1:boxcolor={bg}:boxborderw={pad}:line_spacing={spacing}:x=(w-text_w)/2:y={y}:enable='gte(t,{start:.3})*lt(t,{end:.3})'",
                font = font.drawtext_option(),
                file = quote_filter_value(&file.to_string_lossy()),
                size = style.font_size,
                fg = style.font_color.to_ffmpeg(),
                bg = style.background_color.to_ffmpeg(),
                pad = layout.padding,
                spacing = style.font_size / 4,
                y = y_expression(style.position, caption.slot as u32, pitch, layout),
                start = caption.start,
                end = caption.end,
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Result of the caption stage.
#[derive(Debug)]
pub struct CaptionedTimeline {
    pub clip: Clip,
    pub burned: usize,
    pub warnings: Vec<String>,
}

/// Burn `captions` onto `timeline`. With nothing to draw, the timeline is
/// carried forward unchanged.
#[allow(clippy::too_many_arguments)]
pub async fn burn_captions(
    tool: &FfmpegTool,
    workspace: &JobWorkspace,
    timeline: &Clip,
    timeline_duration: f64,
    captions: &[Caption],
    font: &FontChoice,
    video: &VideoConfig,
    cancel: &CancellationToken,
) -> ReelResult<CaptionedTimeline> {
    let plan = plan_captions(captions, timeline_duration)?;
    for warning in &plan.warnings {
        tracing::warn!(stage = "captions", "{warning}");
    }

    if plan.captions.is_empty() {
        return Ok(CaptionedTimeline {
            clip: timeline.clone(),
            burned: 0,
            warnings: plan.warnings,
        });
    }

    let mut wrapped = Vec::with_capacity(plan.captions.len());
    let mut text_files = Vec::with_capacity(plan.captions.len());
    for caption in plan.captions {
        let text = wrap_text(&caption.text, max_chars_per_line(video.width, caption.style.font_size));
        let file = workspace.file(&format!("caption_{:03}.txt", caption.index));
        tokio::fs::write(&file, &text).await?;
        text_files.push(file);
        wrapped.push((caption, text));
    }

    let chain = drawtext_chain(&wrapped, &text_files, font, video.height);
    let output = workspace.file("captioned.mp4");

    let mut args: Vec<String> = vec![
        "-i".into(),
        timeline.path().to_string_lossy().into_owned(),
        "-vf".into(),
        chain,
        "-an".into(),
    ];
    args.extend(video_encode_args(video));
    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.to_string_lossy().into_owned(),
    ]);

    if let Err(e) = tool.run(&args, cancel).await {
        let _ = std::fs::remove_file(&output);
        return Err(e.into_stage(ReelError::caption_burn));
    }

    tracing::info!(captions = wrapped.len(), "Captions burned in");
    Ok(CaptionedTimeline {
        clip: Clip::new(output, timeline.frames(), video),
        burned: wrapped.len(),
        warnings: plan.warnings,
    })
}
