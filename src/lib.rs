//! musicgen-generator: text-to-music generation with MusicGen ONNX models.
//!
//! A [`MusicGenerator`] loads a pretrained MusicGen export through ONNX
//! Runtime, replicates it across every visible accelerator when there is
//! more than one, and turns a text prompt into a raw waveform.
//!
//! # Modules
//!
//! - [`config`]: Runtime configuration (GeneratorConfig, Device)
//! - [`error`]: Error types and codes (GeneratorError, ErrorCode)
//! - [`generation`]: MusicGenerator and the single-device/replicated generators
//! - [`models`]: Model registry, downloads, device placement and ONNX wrappers
//! - [`types`]: Core data types (ModelConfig, Waveform)
//!
//! # Example
//!
//! ```rust,ignore
//! use musicgen_generator::{Device, GeneratorConfig, MusicGenerator};
//!
//! let config = GeneratorConfig {
//!     device: Device::Auto,
//!     seed: Some(42),
//!     ..GeneratorConfig::for_model("facebook/musicgen-small")
//! };
//!
//! let mut generator = MusicGenerator::new(&config)?;
//! if let Some(waveform) = generator.generate_music("lofi hip hop beats to relax to") {
//!     println!("{:?} at {} Hz", waveform.shape(), waveform.sample_rate());
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod models;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use config::{Device, GeneratorConfig};
pub use error::{ErrorCode, GeneratorError, Result};
pub use generation::{Generator, MusicGenerator, Replicated, SingleDevice, MAX_NEW_TOKENS};
pub use models::{DeviceSelector, Placement};
pub use types::{ModelConfig, Waveform};
