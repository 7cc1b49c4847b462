//! T5 text encoder for MusicGen.
//!
//! Runs `text_encoder.onnx` on one tokenized prompt.

use std::path::Path;

use ndarray::ArrayView1;
use ort::session::Session;
use ort::value::{DynValue, Tensor};

use crate::error::{GeneratorError, Result};

use super::loader::SessionOptions;

/// MusicGen text encoder session.
pub struct MusicGenTextEncoder {
    text_encoder: Session,
}

impl MusicGenTextEncoder {
    /// Loads `text_encoder.onnx` from the given directory.
    pub fn load(model_dir: &Path, options: &SessionOptions) -> Result<Self> {
        let text_encoder = options.load_session(&model_dir.join("text_encoder.onnx"))?;
        Ok(Self { text_encoder })
    }

    /// Encodes one prompt row into hidden states.
    ///
    /// Returns `(last_hidden_state, attention_mask)`, both with a batch of 1,
    /// ready to condition the decoder.
    pub fn encode(
        &mut self,
        input_ids: ArrayView1<'_, i64>,
        attention_mask: ArrayView1<'_, i64>,
    ) -> Result<(DynValue, DynValue)> {
        let tokens_len = input_ids.len();
        if tokens_len == 0 {
            return Err(GeneratorError::invalid_input("empty token sequence"));
        }

        let input_ids = Tensor::from_array(([1, tokens_len], input_ids.to_vec())).map_err(|e| {
            GeneratorError::model_inference_failed(format!("Failed to create input tensor: {}", e))
        })?;

        let mask = attention_mask.to_vec();
        let encoder_mask = Tensor::from_array(([1, tokens_len], mask.clone())).map_err(|e| {
            GeneratorError::model_inference_failed(format!("Failed to create attention mask: {}", e))
        })?;

        let mut output = self
            .text_encoder
            .run(ort::inputs![input_ids, encoder_mask])
            .map_err(|e| {
                GeneratorError::model_inference_failed(format!(
                    "Text encoder inference failed: {}",
                    e
                ))
            })?;

        let last_hidden_state = output.remove("last_hidden_state").ok_or_else(|| {
            GeneratorError::model_inference_failed("last_hidden_state not found in output")
        })?;

        // The session consumed its inputs, so the decoder gets its own mask.
        let decoder_mask = Tensor::from_array(([1, tokens_len], mask)).map_err(|e| {
            GeneratorError::model_inference_failed(format!(
                "Failed to create decoder attention mask: {}",
                e
            ))
        })?;

        Ok((last_hidden_state, decoder_mask.into_dyn()))
    }
}
