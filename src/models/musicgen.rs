//! One complete MusicGen replica: text encoder, decoder and audio codec
//! loaded on a single device.

use std::path::Path;

use ndarray::{concatenate, Array3, Axis};
use tracing::{debug, info};

use crate::error::{GeneratorError, Result};
use crate::types::ModelConfig;

use super::audio_codec::MusicGenAudioCodec;
use super::decoder::MusicGenDecoder;
use super::loader::{check_models, SessionOptions};
use super::processor::EncodedBatch;
use super::text_encoder::MusicGenTextEncoder;
use super::AudioModel;

/// MusicGen ONNX sessions for one device.
pub struct MusicGenModel {
    /// Text encoder for converting prompts to embeddings.
    pub text_encoder: MusicGenTextEncoder,
    /// Decoder for autoregressive token generation.
    pub decoder: MusicGenDecoder,
    /// Audio codec for converting tokens to audio samples.
    pub audio_codec: MusicGenAudioCodec,
    /// Model configuration.
    pub config: ModelConfig,
    options: SessionOptions,
}

impl MusicGenModel {
    /// Loads all MusicGen sessions from a directory onto one device.
    ///
    /// The directory must contain `text_encoder.onnx`, `decoder_model.onnx`,
    /// `decoder_with_past_model.onnx` and `encodec_decode.onnx`.
    pub fn load(
        model_dir: &Path,
        config: ModelConfig,
        options: SessionOptions,
        seed: Option<u64>,
    ) -> Result<Self> {
        check_models(model_dir)?;

        info!("Loading text encoder on {}...", options.device);
        let text_encoder = MusicGenTextEncoder::load(model_dir, &options)?;

        info!("Loading decoder models on {}...", options.device);
        let decoder = MusicGenDecoder::load(model_dir, config.clone(), &options, seed)?;

        info!("Loading audio codec on {}...", options.device);
        let audio_codec = MusicGenAudioCodec::load(model_dir, &options)?;

        Ok(Self {
            text_encoder,
            decoder,
            audio_codec,
            config,
            options,
        })
    }
}

impl AudioModel for MusicGenModel {
    fn generate(&mut self, inputs: &EncodedBatch, max_new_tokens: usize) -> Result<Array3<f32>> {
        let mut rows = Vec::with_capacity(inputs.batch_size());

        for index in 0..inputs.batch_size() {
            let (ids, mask) = inputs.row(index);

            let (hidden_states, attention_mask) = self.text_encoder.encode(ids, mask)?;

            debug!("Generating {} tokens on {}", max_new_tokens, self.options.device);
            let frames = self
                .decoder
                .generate_tokens(hidden_states, attention_mask, max_new_tokens)?;

            debug!("Decoding {} frames", frames.len());
            rows.push(self.audio_codec.decode(&frames)?);
        }

        let views: Vec<_> = rows.iter().map(|r| r.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| {
            GeneratorError::model_inference_failed(format!("Failed to stack batch audio: {}", e))
        })
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}
