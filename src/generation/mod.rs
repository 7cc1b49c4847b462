//! Audio generation module.
//!
//! Provides the [`MusicGenerator`] pipeline and the single-device and
//! replicated [`Generator`] implementations it drives.

mod panics;
pub mod pipeline;
pub mod replicated;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used items
pub use pipeline::{MusicGenerator, MAX_NEW_TOKENS};
pub use replicated::{Generator, Replicated, SingleDevice};
