//! Shortreel Script Model
//!
//! Defines the data contracts that cross the assembly pipeline boundary:
//! - **Script:** Ordered scenes, timed captions, audio tracks, free-form metadata
//! - **Style:** Caption colors and anchor positions, parsed leniently
//! - **Artifact:** The immutable descriptor returned for a rendered video
//! - **Platform:** Duration and size limits of the short-form targets
//!
//! All times are in seconds relative to the start of the final timeline.

pub mod artifact;
pub mod platform;
pub mod script;
pub mod style;

pub use artifact::*;
pub use platform::*;
pub use script::*;
pub use style::*;
