//! Shared building blocks for the pupil interface crates.
//!
//! ## Architecture
//!
//! - **common** (this crate): error locations and wall-clock timestamps
//! - **pupil-core**: event correlation, listener, host dispatcher
//! - **pupil-script**: runnable client script wiring everything together

pub mod error;
pub mod timestamp;

pub use error::error_location::ErrorLocation;
pub use timestamp::now_seconds;
