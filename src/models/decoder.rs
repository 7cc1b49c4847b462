//! MusicGen decoder wrapper with KV cache support.
//!
//! Implements autoregressive token generation using the split decoder export:
//! `decoder_model.onnx` for the first step and `decoder_with_past_model.onnx`
//! for every following step.

use std::borrow::Cow;
use std::path::Path;

use half::f16;
use ort::session::{Session, SessionInputValue, SessionOutputs};
use ort::value::{DynValue, Tensor};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::{GeneratorError, Result};
use crate::types::ModelConfig;

use super::delay_pattern::DelayPattern;
use super::loader::SessionOptions;
use super::logits::{Logits, DEFAULT_GUIDANCE_SCALE, DEFAULT_TOP_K};

/// Number of EnCodec codebooks MusicGen predicts per step.
pub const CODEBOOKS: usize = 4;

/// One audio frame: a token for each codebook.
pub type Frame = [i64; CODEBOOKS];

/// MusicGen decoder using split architecture with KV cache.
pub struct MusicGenDecoder {
    decoder_model: Session,
    decoder_with_past: Session,
    config: ModelConfig,
    rng: ChaCha8Rng,
}

impl MusicGenDecoder {
    /// Loads the decoder models from a directory.
    ///
    /// Expects `decoder_model.onnx` and `decoder_with_past_model.onnx` in the
    /// directory. Sampling is seeded from `seed`, or from entropy when None.
    pub fn load(
        model_dir: &Path,
        config: ModelConfig,
        options: &SessionOptions,
        seed: Option<u64>,
    ) -> Result<Self> {
        let decoder_model = options.load_session(&model_dir.join("decoder_model.onnx"))?;
        let decoder_with_past =
            options.load_session(&model_dir.join("decoder_with_past_model.onnx"))?;

        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Ok(Self {
            decoder_model,
            decoder_with_past,
            config,
            rng,
        })
    }

    /// Generates audio frames autoregressively from encoder hidden states.
    ///
    /// Runs exactly `max_new_tokens` decoder steps. Because of the delay
    /// pattern the first `CODEBOOKS - 1` steps complete no frame, so
    /// `max_new_tokens - 3` frames are returned.
    pub fn generate_tokens(
        &mut self,
        encoder_hidden_states: DynValue,
        encoder_attention_mask: DynValue,
        max_new_tokens: usize,
    ) -> Result<Vec<Frame>> {
        if max_new_tokens == 0 {
            return Ok(Vec::new());
        }

        let num_hidden_layers = self.config.num_hidden_layers as usize;
        let pad_token_id = self.config.pad_token_id;

        // Conditional and unconditional halves for classifier-free guidance
        let encoder_hidden_states = duplicate_with_zeros(&encoder_hidden_states)?;
        let encoder_attention_mask = duplicate_with_zeros_typed::<i64>(&encoder_attention_mask)?;

        let mut pattern = DelayPattern::<CODEBOOKS>::new();
        let mut frames = Vec::with_capacity(max_new_tokens.saturating_sub(CODEBOOKS - 1));

        // First step: full decoder over pad tokens
        let initial_input_ids = step_input_ids([pad_token_id; CODEBOOKS])?;
        let session_inputs: Vec<(Cow<str>, SessionInputValue)> = vec![
            (
                Cow::from("encoder_attention_mask"),
                SessionInputValue::from(encoder_attention_mask.view()),
            ),
            (
                Cow::from("encoder_hidden_states"),
                SessionInputValue::from(encoder_hidden_states.view()),
            ),
            (
                Cow::from("input_ids"),
                SessionInputValue::from(initial_input_ids.view()),
            ),
        ];

        let mut outputs = self.decoder_model.run(session_inputs).map_err(|e| {
            GeneratorError::model_inference_failed(format!("Initial decoder inference failed: {}", e))
        })?;

        pattern.push(sample_step(&mut outputs, &mut self.rng)?);

        let mut kv_cache: Vec<(String, DynValue)> = Vec::with_capacity(num_hidden_layers * 4);
        for j in 0..num_hidden_layers {
            for part in ["decoder.key", "decoder.value", "encoder.key", "encoder.value"] {
                let value = take_output(&mut outputs, &format!("present.{j}.{part}"))?;
                kv_cache.push((format!("past_key_values.{j}.{part}"), value));
            }
        }
        drop(outputs);

        for step in 1..max_new_tokens {
            let input_ids = step_input_ids(pattern.next_input(pad_token_id))?;

            let mut session_inputs: Vec<(Cow<str>, SessionInputValue)> = vec![
                (Cow::from("input_ids"), SessionInputValue::from(input_ids.view())),
                (
                    Cow::from("encoder_attention_mask"),
                    SessionInputValue::from(encoder_attention_mask.view()),
                ),
            ];
            for (k, v) in &kv_cache {
                session_inputs.push((Cow::from(k.as_str()), SessionInputValue::from(v.view())));
            }

            let mut outputs = self.decoder_with_past.run(session_inputs).map_err(|e| {
                GeneratorError::model_inference_failed(format!(
                    "Decoder with past inference failed at step {}: {}",
                    step, e
                ))
            })?;

            pattern.push(sample_step(&mut outputs, &mut self.rng)?);

            if let Some(frame) = pattern.last_frame() {
                frames.push(frame);
            }

            // Only the decoder self-attention cache grows; encoder entries stay.
            for j in 0..num_hidden_layers {
                kv_cache[j * 4].1 = take_output(&mut outputs, &format!("present.{j}.decoder.key"))?;
                kv_cache[j * 4 + 1].1 =
                    take_output(&mut outputs, &format!("present.{j}.decoder.value"))?;
            }

            if step % 100 == 0 {
                debug!("decoder step {}/{}", step, max_new_tokens);
            }
        }

        Ok(frames)
    }
}

/// Decoder input for one step, repeated for both guidance halves.
fn step_input_ids(tokens: Frame) -> Result<Tensor<i64>> {
    let mut ids = Vec::with_capacity(CODEBOOKS * 2);
    ids.extend_from_slice(&tokens);
    ids.extend_from_slice(&tokens);
    Tensor::from_array(([CODEBOOKS * 2, 1], ids)).map_err(|e| {
        GeneratorError::model_inference_failed(format!("Failed to create input_ids: {}", e))
    })
}

/// Guides and samples the logits of one decoder step.
fn sample_step(outputs: &mut SessionOutputs<'_>, rng: &mut ChaCha8Rng) -> Result<Frame> {
    let logits_value = take_output(outputs, "logits")?;
    let tokens = Logits::from_3d_dyn_value(&logits_value)?
        .apply_free_guidance(DEFAULT_GUIDANCE_SCALE)?
        .sample_top_k(DEFAULT_TOP_K, rng)?;

    let count = tokens.len();
    tokens.try_into().map_err(|_| {
        GeneratorError::model_inference_failed(format!(
            "Expected {} codebook tokens per step, got {}",
            CODEBOOKS, count
        ))
    })
}

fn take_output(outputs: &mut SessionOutputs<'_>, name: &str) -> Result<DynValue> {
    outputs
        .remove(name)
        .ok_or_else(|| GeneratorError::model_inference_failed(format!("{} not found in output", name)))
}

/// Doubles a tensor along the first dimension, filling the new half with zeros.
/// Detects f16 vs f32 hidden states.
fn duplicate_with_zeros(tensor: &DynValue) -> Result<DynValue> {
    if let Ok(result) = duplicate_with_zeros_typed::<f16>(tensor) {
        return Ok(result);
    }
    duplicate_with_zeros_typed::<f32>(tensor)
}

fn duplicate_with_zeros_typed<T>(tensor: &DynValue) -> Result<DynValue>
where
    T: ort::tensor::PrimitiveTensorElementType + Clone + Default + std::fmt::Debug + 'static,
{
    let (shape, data_slice) = tensor.try_extract_tensor::<T>().map_err(|e| {
        GeneratorError::model_inference_failed(format!("Failed to extract tensor: {}", e))
    })?;

    let mut new_shape: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
    if new_shape.is_empty() {
        return Err(GeneratorError::model_inference_failed(
            "Cannot duplicate a scalar tensor",
        ));
    }
    new_shape[0] *= 2;

    let mut combined: Vec<T> = Vec::with_capacity(data_slice.len() * 2);
    combined.extend_from_slice(data_slice);
    combined.resize(data_slice.len() * 2, T::default());

    let result = Tensor::from_array((new_shape, combined)).map_err(|e| {
        GeneratorError::model_inference_failed(format!("Failed to create duplicated tensor: {}", e))
    })?;

    Ok(result.into_dyn())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_input_repeats_for_guidance() {
        let tensor = step_input_ids([1, 2, 3, 4]).unwrap();
        let (shape, data) = tensor.try_extract_tensor::<i64>().unwrap();
        assert_eq!(shape.iter().copied().collect::<Vec<_>>(), vec![8, 1]);
        assert_eq!(data, &[1, 2, 3, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn duplicate_appends_zero_half() {
        let tensor = Tensor::from_array(([1usize, 3], vec![1.5f32, -2.0, 0.25]))
            .unwrap()
            .into_dyn();
        let doubled = duplicate_with_zeros(&tensor).unwrap();
        let (shape, data) = doubled.try_extract_tensor::<f32>().unwrap();
        assert_eq!(shape.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(data, &[1.5, -2.0, 0.25, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn duplicate_mask_keeps_integers() {
        let mask = Tensor::from_array(([1usize, 2], vec![1i64, 0])).unwrap().into_dyn();
        let doubled = duplicate_with_zeros_typed::<i64>(&mask).unwrap();
        let (_, data) = doubled.try_extract_tensor::<i64>().unwrap();
        assert_eq!(data, &[1, 0, 0, 0]);
    }
}
