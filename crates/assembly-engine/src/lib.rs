//! Shortreel Assembly Engine
//!
//! Turns a validated script into a finished vertical video by driving
//! ffmpeg through a fixed sequence of stages:
//!
//! ```text
//! scenes ──┬── render (bounded pool, ordered results)
//!          │        │
//!          │        ▼
//!          │   concatenate (stream copy or re-encode)
//!          │        │
//! captions ┴────────┼── burn-in (drawtext, stacked slots)
//!                   │
//! audio tracks ─────┼── decode + envelope + mix
//!                   ▼
//!               final.mp4 ── probe ── commit to output path
//! ```
//!
//! Every job owns a private temporary workspace that is removed on
//! success, failure, and cancellation alike.

pub mod audio;
pub mod captions;
pub mod concat;
pub mod fetch;
pub mod ffmpeg;
pub mod fonts;
pub mod metadata;
pub mod pipeline;
pub mod scene;
pub mod workspace;

pub use fetch::{AssetFetcher, LocalAssetFetcher};
pub use ffmpeg::{FfmpegTool, MediaInfo};
pub use pipeline::*;
