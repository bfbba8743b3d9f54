//! Clock and timing utilities for assembly jobs.
//!
//! Each job is anchored to a monotonic start instant plus the wall-clock
//! time at start. This module provides utilities for:
//! - Stamping job ids and artifacts
//! - Measuring duration drift between expected and produced media

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::{Duration, Instant};

/// A job clock that provides elapsed time relative to the moment a job started.
#[derive(Debug, Clone)]
pub struct JobClock {
    /// The instant the job started.
    started: Instant,

    /// Wall-clock time at start.
    started_wall: DateTime<Utc>,

    /// Random tag telling apart jobs started within the same second.
    tag: String,
}

impl JobClock {
    /// Create a new job clock anchored to now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_wall: Utc::now(),
            tag: format!("{:06x}", rand::thread_rng().gen_range(0..0x100_0000u32)),
        }
    }

    /// Time elapsed since the job started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Seconds elapsed since the job started.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Compact `YYYYMMDD_HHMMSS` stamp of the start time, used in ids.
    pub fn stamp(&self) -> String {
        self.started_wall.format("%Y%m%d_%H%M%S").to_string()
    }

    /// Six hex digits, random per job.
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Duration of one frame at `fps`, in seconds.
pub fn frame_interval_secs(fps: u32) -> f64 {
    1.0 / fps.max(1) as f64
}

/// Drift between an expected duration and the measured one.
#[derive(Debug, Clone, Copy)]
pub struct DurationDrift {
    /// Duration the timeline should have (seconds).
    pub expected: f64,
    /// Duration actually measured (seconds).
    pub actual: f64,
}

impl DurationDrift {
    /// Drift in seconds (positive = measured is longer).
    pub fn drift_secs(&self) -> f64 {
        self.actual - self.expected
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_secs() * 1000.0
    }

    /// Whether drift exceeds the tolerance (seconds).
    pub fn exceeds(&self, tolerance_secs: f64) -> bool {
        self.drift_secs().abs() > tolerance_secs
    }
}
