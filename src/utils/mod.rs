//! Utility functions and data structures.
//!
//! - [`app_data`] - Application config directory and settings
//! - [`encoding`] - Little-endian field codec for the binary index format
//! - [`progress`] - Progress bar that compiles away without the `progress` feature

pub mod app_data;
pub mod encoding;
pub mod progress;

pub use app_data::*;
pub use encoding::*;
