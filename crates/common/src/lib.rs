//! Shortreel Common Utilities
//!
//! Shared infrastructure for all Shortreel crates:
//! - Error taxonomy and result alias for the assembly pipeline
//! - Job clock and frame/duration conversions
//! - Tracing/logging initialization
//! - Configuration loading (canonical video format, fonts, render limits)

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
