//! Audio mixer: decodes tracks, applies envelopes, sums them, and muxes
//! the mix with the video timeline.
//!
//! All mixing happens on interleaved stereo `f32` PCM at the configured
//! sample rate. Track placement and envelopes are pure functions so they
//! can be tested without ffmpeg.

use std::path::Path;

use shortreel_common::config::VideoConfig;
use shortreel_common::error::{ReelError, ReelResult};
use tokio_util::sync::CancellationToken;

use crate::ffmpeg::FfmpegTool;

/// Output channel count.
pub const CHANNELS: usize = 2;

/// Share of samples allowed to clip before the mix is normalized instead.
pub const NORMALIZE_THRESHOLD: f64 = 0.001;

/// Time-varying gain of one track: linear fade in, hold, linear fade out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub volume: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    /// Effective length of the track on the timeline (seconds).
    pub span: f64,
}

impl Envelope {
    /// Gain at `t` seconds after the track starts.
    pub fn gain(&self, t: f64) -> f64 {
        if !(0.0..self.span).contains(&t) {
            return 0.0;
        }
        let ramp_in = if self.fade_in > 0.0 {
            (t / self.fade_in).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let ramp_out = if self.fade_out > 0.0 {
            ((self.span - t) / self.fade_out).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.volume * ramp_in.min(ramp_out)
    }
}

/// Where a track lands on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// The track starts at or after the end of the timeline.
    Omitted,
    Placed {
        /// First output frame (stereo sample pair) of the track.
        start_frame: usize,
        /// Number of frames that fit on the timeline.
        frames: usize,
        /// Whether the source was cut short at the end of the timeline.
        truncated: bool,
    },
}

/// Place a source of `source_frames` frames starting at `start_time` on a
/// timeline of `timeline_frames` frames.
pub fn place_track(
    start_time: f64,
    source_frames: usize,
    timeline_frames: usize,
    sample_rate: u32,
) -> Placement {
    let start_frame = (start_time.max(0.0) * sample_rate as f64).round() as usize;
    if start_frame >= timeline_frames || source_frames == 0 {
        return Placement::Omitted;
    }
    let room = timeline_frames - start_frame;
    Placement::Placed {
        start_frame,
        frames: source_frames.min(room),
        truncated: source_frames > room,
    }
}

/// A decoded track ready to mix.
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    pub label: String,
    /// Interleaved stereo PCM.
    pub samples: Vec<f32>,
    pub start_time: f64,
    pub volume: f64,
    pub fade_in: f64,
    pub fade_out: f64,
}

impl DecodedTrack {
    pub fn frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }
}

/// Summed audio for the whole timeline.
#[derive(Debug, Clone)]
pub struct MixOutcome {
    /// Interleaved stereo PCM, exactly as long as the timeline.
    pub samples: Vec<f32>,
    pub warnings: Vec<String>,
    /// Samples that exceeded full scale before limiting.
    pub clipped_samples: usize,
    pub normalized: bool,
    /// Tracks that contributed to the mix.
    pub mixed_tracks: usize,
}

/// Mix `tracks` onto a timeline of `timeline_secs` seconds.
///
/// The result never leaves [-1, 1]: a mix that clips rarely is clamped, one
/// that clips often is scaled down by its peak first.
pub fn mix_tracks(tracks: &[DecodedTrack], timeline_secs: f64, sample_rate: u32) -> MixOutcome {
    let timeline_frames = (timeline_secs.max(0.0) * sample_rate as f64).round() as usize;
    let mut out = vec![0.0f32; timeline_frames * CHANNELS];
    let mut warnings = Vec::new();
    let mut mixed_tracks = 0;

    for track in tracks {
        if track.start_time < 0.0 {
            warnings.push(format!(
                "{}: negative start_time {:.3}s treated as 0",
                track.label, track.start_time
            ));
        }
        let placement = place_track(track.start_time, track.frames(), timeline_frames, sample_rate);
        let (start_frame, frames) = match placement {
            Placement::Omitted => {
                warnings.push(format!(
                    "{}: starts at {:.3}s, at or beyond the {timeline_secs:.3}s timeline; omitted",
                    track.label, track.start_time
                ));
                continue;
            }
            Placement::Placed {
                start_frame,
                frames,
                truncated,
            } => {
                if truncated {
                    warnings.push(format!(
                        "{}: truncated to {:.3}s to fit the timeline",
                        track.label,
                        frames as f64 / sample_rate as f64
                    ));
                }
                (start_frame, frames)
            }
        };

        let envelope = Envelope {
            volume: if track.volume.is_nan() {
                0.0
            } else {
                track.volume.clamp(0.0, 1.0)
            },
            fade_in: track.fade_in.max(0.0),
            fade_out: track.fade_out.max(0.0),
            span: frames as f64 / sample_rate as f64,
        };

        for frame in 0..frames {
            let gain = envelope.gain(frame as f64 / sample_rate as f64) as f32;
            let src = frame * CHANNELS;
            let dst = (start_frame + frame) * CHANNELS;
            for ch in 0..CHANNELS {
                out[dst + ch] += track.samples[src + ch] * gain;
            }
        }
        mixed_tracks += 1;
    }

    let clipped_samples = out.iter().filter(|s| s.abs() > 1.0).count();
    let normalized =
        !out.is_empty() && clipped_samples as f64 / out.len() as f64 > NORMALIZE_THRESHOLD;
    if normalized {
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > 0.0 {
            for s in &mut out {
                *s /= peak;
            }
        }
    }
    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }

    MixOutcome {
        samples: out,
        warnings,
        clipped_samples,
        normalized,
        mixed_tracks,
    }
}

/// Interleaved `f32` samples as raw little-endian bytes.
pub fn f32le_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Raw little-endian bytes back to samples. Trailing partial samples are an error.
pub fn samples_from_f32le(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Decode any audio-bearing file to interleaved stereo `f32` at `sample_rate`.
pub async fn decode_track(
    tool: &FfmpegTool,
    path: &Path,
    label: &str,
    sample_rate: u32,
    cancel: &CancellationToken,
) -> ReelResult<Vec<f32>> {
    let args: Vec<String> = vec![
        "-i".into(),
        path.to_string_lossy().into_owned(),
        "-vn".into(),
        "-f".into(),
        "f32le".into(),
        "-acodec".into(),
        "pcm_f32le".into(),
        "-ac".into(),
        CHANNELS.to_string(),
        "-ar".into(),
        sample_rate.to_string(),
        "pipe:1".into(),
    ];
    let bytes = tool
        .run(&args, cancel)
        .await
        .map_err(|e| {
            e.into_stage(|msg| ReelError::audio_mix(label, format!("decode failed: {msg}")))
        })?;
    let samples = samples_from_f32le(&bytes)
        .ok_or_else(|| ReelError::audio_mix(label, "decoded audio is not aligned to f32 samples"))?;
    if samples.is_empty() {
        return Err(ReelError::audio_mix(label, "source contains no audio"));
    }
    Ok(samples)
}

/// Write the mix and mux it under the video stream (video is copied).
pub async fn mux_with_audio(
    tool: &FfmpegTool,
    video_path: &Path,
    mix: &[f32],
    mix_path: &Path,
    output: &Path,
    video: &VideoConfig,
    cancel: &CancellationToken,
) -> ReelResult<()> {
    tokio::fs::write(mix_path, f32le_bytes(mix)).await?;

    let args: Vec<String> = vec![
        "-i".into(),
        video_path.to_string_lossy().into_owned(),
        "-f".into(),
        "f32le".into(),
        "-ar".into(),
        video.audio_sample_rate.to_string(),
        "-ac".into(),
        CHANNELS.to_string(),
        "-i".into(),
        mix_path.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        video.audio_codec.clone(),
        "-b:a".into(),
        format!("{}k", video.audio_bitrate_kbps),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ];
    run_final(tool, &args, output, cancel).await
}

/// No tracks: copy the video stream and write no audio stream at all.
pub async fn mux_video_only(
    tool: &FfmpegTool,
    video_path: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> ReelResult<()> {
    let args: Vec<String> = vec![
        "-i".into(),
        video_path.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-an".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ];
    run_final(tool, &args, output, cancel).await
}

async fn run_final(
    tool: &FfmpegTool,
    args: &[String],
    output: &Path,
    cancel: &CancellationToken,
) -> ReelResult<()> {
    if let Err(e) = tool.run(args, cancel).await {
        // Partial audio must never reach the caller.
        let _ = std::fs::remove_file(output);
        return Err(
            e.into_stage(|msg| ReelError::audio_mix("mixdown", format!("mux failed: {msg}")))
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RATE: u32 = 1000;

    fn dc_track(level: f32, secs: f64, start: f64, volume: f64, fade_in: f64, fade_out: f64) -> DecodedTrack {
        let frames = (secs * RATE as f64) as usize;
        DecodedTrack {
            label: "test".to_string(),
            samples: vec![level; frames * CHANNELS],
            start_time: start,
            volume,
            fade_in,
            fade_out,
        }
    }

    fn at(samples: &[f32], secs: f64) -> f32 {
        samples[(secs * RATE as f64) as usize * CHANNELS]
    }

    #[test]
    fn test_envelope_shape() {
        let env = Envelope {
            volume: 0.3,
            fade_in: 1.0,
            fade_out: 2.0,
            span: 9.0,
        };
        assert_eq!(env.gain(0.0), 0.0);
        assert!((env.gain(0.5) - 0.15).abs() < 1e-9);
        assert!((env.gain(1.0) - 0.3).abs() < 1e-9);
        assert!((env.gain(5.0) - 0.3).abs() < 1e-9);
        assert!((env.gain(8.0) - 0.15).abs() < 1e-9);
        assert_eq!(env.gain(9.0), 0.0);
        assert_eq!(env.gain(-0.1), 0.0);
    }

    #[test]
    fn test_fade_ramps_on_the_timeline() {
        // start 1.0, volume 0.3, fade in 1.0, fade out 2.0, on a 10 s video.
        let track = dc_track(1.0, 20.0, 1.0, 0.3, 1.0, 2.0);
        let mix = mix_tracks(&[track], 10.0, RATE);
        let s = &mix.samples;
        assert_eq!(s.len(), 10 * RATE as usize * CHANNELS);
        assert_eq!(at(s, 0.5), 0.0);
        assert!((at(s, 1.5) - 0.15).abs() < 1e-3);
        assert!((at(s, 2.0) - 0.3).abs() < 1e-3);
        assert!((at(s, 5.0) - 0.3).abs() < 1e-3);
        assert!((at(s, 9.0) - 0.15).abs() < 1e-3);
        assert!(at(s, 9.999).abs() < 1e-3);
        assert!(mix.warnings.iter().any(|w| w.contains("truncated")));
    }

    #[test]
    fn test_track_starting_after_end_is_omitted_with_warning() {
        let track = dc_track(0.5, 2.0, 10.0, 1.0, 0.0, 0.0);
        let mix = mix_tracks(&[track], 10.0, RATE);
        assert_eq!(mix.mixed_tracks, 0);
        assert!(mix.samples.iter().all(|s| *s == 0.0));
        assert!(mix.warnings[0].contains("omitted"));
    }

    #[test]
    fn test_placement() {
        assert_eq!(place_track(11.0, 100, 10_000, RATE), Placement::Omitted);
        assert_eq!(
            place_track(9.0, 5000, 10_000, RATE),
            Placement::Placed {
                start_frame: 9000,
                frames: 1000,
                truncated: true
            }
        );
        assert_eq!(
            place_track(-2.0, 100, 10_000, RATE),
            Placement::Placed {
                start_frame: 0,
                frames: 100,
                truncated: false
            }
        );
    }

    #[test]
    fn test_rare_clipping_is_clamped() {
        let mut loud = dc_track(0.5, 10.0, 0.0, 1.0, 0.0, 0.0);
        // A single spike well above full scale.
        loud.samples[0] = 3.0;
        let quiet = dc_track(0.2, 10.0, 0.0, 1.0, 0.0, 0.0);
        let mix = mix_tracks(&[loud, quiet], 10.0, RATE);
        assert!(!mix.normalized);
        assert_eq!(mix.clipped_samples, 1);
        assert_eq!(mix.samples[0], 1.0);
        assert!((mix.samples[2] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_frequent_clipping_is_normalized() {
        let a = dc_track(0.8, 10.0, 0.0, 1.0, 0.0, 0.0);
        let b = dc_track(0.8, 10.0, 0.0, 1.0, 0.0, 0.0);
        let mix = mix_tracks(&[a, b], 10.0, RATE);
        assert!(mix.normalized);
        assert!((mix.samples[100] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_f32le_round_trip_rejects_partial_sample() {
        let bytes = f32le_bytes(&[0.25, -0.5]);
        assert_eq!(samples_from_f32le(&bytes), Some(vec![0.25, -0.5]));
        assert_eq!(samples_from_f32le(&bytes[..7]), None);
    }

    proptest! {
        #[test]
        fn prop_mix_stays_in_range(
            levels in proptest::collection::vec(-4.0f32..4.0, 1..6),
            starts in proptest::collection::vec(0.0f64..3.0, 6),
        ) {
            let tracks: Vec<DecodedTrack> = levels
                .iter()
                .zip(&starts)
                .map(|(level, start)| dc_track(*level, 2.0, *start, 1.0, 0.2, 0.2))
                .collect();
            let mix = mix_tracks(&tracks, 3.0, RATE);
            prop_assert!(mix.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        }

        #[test]
        fn prop_envelope_within_volume(
            volume in 0.0f64..=1.0,
            fade_in in 0.0f64..5.0,
            fade_out in 0.0f64..5.0,
            span in 0.1f64..20.0,
            t in -1.0f64..25.0,
        ) {
            let env = Envelope { volume, fade_in, fade_out, span };
            let g = env.gain(t);
            prop_assert!(g >= 0.0 && g <= volume + 1e-12);
        }
    }
}
