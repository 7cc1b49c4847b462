//! MusicGen model components.
//!
//! This module contains the model registry and the ONNX model wrappers:
//! - [`TextProcessor`](processor::TextProcessor): Prompt tokenization with padding
//! - [`TextEncoder`](text_encoder::MusicGenTextEncoder): Text prompt encoding
//! - [`Decoder`](decoder::MusicGenDecoder): Autoregressive token generation
//! - [`AudioCodec`](audio_codec::MusicGenAudioCodec): Token to audio decoding
//! - [`DelayPattern`](delay_pattern::DelayPattern): 4-codebook delay pattern
//! - [`Logits`](logits::Logits): Guidance and top-k sampling
//! - [`device`]: Device detection and placement

use ndarray::Array3;

use crate::error::Result;

pub mod audio_codec;
pub mod decoder;
pub mod delay_pattern;
pub mod device;
pub mod downloader;
pub mod loader;
pub mod logits;
pub mod musicgen;
pub mod processor;
pub mod registry;
pub mod text_encoder;

pub use device::{
    select_placement, ComputeDevice, DeviceSelector, OrtDeviceSelector, Placement, StaticDevices,
};
pub use downloader::ensure_models;
pub use loader::{check_models, load_config, SessionOptions};
pub use musicgen::MusicGenModel;
pub use processor::{EncodedBatch, MusicGenProcessor, TextProcessor};
pub use registry::{resolve, ResolvedModel, DEFAULT_MODEL_ID, REGISTERED_MODELS};

/// A generative model hosted on one device.
pub trait AudioModel: Send {
    /// Generates audio of shape `[batch, channels, samples]` for every row of
    /// `inputs`, running `max_new_tokens` decoder steps per row.
    fn generate(&mut self, inputs: &EncodedBatch, max_new_tokens: usize) -> Result<Array3<f32>>;

    /// Sample rate of the produced audio in Hz.
    fn sample_rate(&self) -> u32;
}
