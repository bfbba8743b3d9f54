//! Shortreel Script Sources
//!
//! Where scripts come from before assembly:
//! - **File:** A script JSON already on disk
//! - **Generated:** A text-generation backend prompted with a topic, retried
//!   across a pool of API credentials until one succeeds
//!
//! No network backend ships with this crate; callers plug one in through
//! [`GenerationBackend`].

pub mod request;
pub mod response;
pub mod rotation;
pub mod source;

pub use request::*;
pub use rotation::{mask_key, CredentialPool, RetryPolicy, RotationError};
pub use source::*;
