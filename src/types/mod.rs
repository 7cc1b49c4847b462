//! Core data types for the music generator:
//! - [`ModelConfig`]: Architecture parameters of a MusicGen export
//! - [`Waveform`]: Audio returned from a generation call

mod config;
mod waveform;

pub use config::ModelConfig;
pub use waveform::Waveform;
