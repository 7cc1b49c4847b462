//! Logits processing for MusicGen decoder output.
//!
//! Handles classifier-free guidance and top-k sampling for token generation.

use std::fmt::{Debug, Formatter};
use std::ops::Deref;

use half::f16;
use ndarray::{s, Array, Array2, Axis, Ix3, IxDyn};
use ort::value::DynValue;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;

use crate::error::{GeneratorError, Result};

/// Default guidance scale for MusicGen.
pub const DEFAULT_GUIDANCE_SCALE: f32 = 3.0;

/// Default top-k value for sampling.
pub const DEFAULT_TOP_K: usize = 250;

/// Wrapper around a `[batch, vocab]` logits array.
pub struct Logits(Array2<f32>);

impl Deref for Logits {
    type Target = Array2<f32>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Debug for Logits {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Logits({:?})", self.0.dim())
    }
}

impl Logits {
    pub fn new(logits: Array2<f32>) -> Self {
        Self(logits)
    }

    /// Creates Logits from a 3D DynValue, supporting both f32 and f16.
    ///
    /// The input shape is `[batch_size, decoder_sequence_length, vocab_size]`
    /// with a sequence length of 1, which is dropped.
    pub fn from_3d_dyn_value(value: &DynValue) -> Result<Self> {
        let (shape, data): (Vec<usize>, Vec<f32>) =
            if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                (shape.iter().map(|&x| x as usize).collect(), data.to_vec())
            } else if let Ok((shape, data)) = value.try_extract_tensor::<f16>() {
                (
                    shape.iter().map(|&x| x as usize).collect(),
                    data.iter().map(|e| f32::from(*e)).collect(),
                )
            } else {
                return Err(GeneratorError::model_inference_failed(
                    "Logits must be f32 or f16",
                ));
            };

        let arr = Array::from_shape_vec(IxDyn(&shape), data).map_err(|e| {
            GeneratorError::model_inference_failed(format!("Failed to create array: {}", e))
        })?;

        let arr = arr.into_dimensionality::<Ix3>().map_err(|e| {
            GeneratorError::model_inference_failed(format!("Expected 3D logits: {}", e))
        })?;

        if arr.len_of(Axis(1)) != 1 {
            return Err(GeneratorError::model_inference_failed(format!(
                "Expected decoder sequence length 1, got {}",
                arr.len_of(Axis(1))
            )));
        }

        Ok(Self(arr.remove_axis(Axis(1))))
    }

    /// Applies classifier-free guidance to the logits.
    ///
    /// Conditional logits fill the first half of the batch and unconditional
    /// logits the second half:
    /// `guided = uncond + (cond - uncond) * scale`
    pub fn apply_free_guidance(self, guidance_scale: f32) -> Result<Self> {
        let batch = self.0.dim().0;
        if batch % 2 != 0 {
            return Err(GeneratorError::model_inference_failed(format!(
                "Free guidance needs an even batch, got {}",
                batch
            )));
        }

        let half = batch / 2;
        let cond = self.0.slice(s![0..half, ..]);
        let uncond = self.0.slice(s![half.., ..]);

        Ok(Self((&cond - &uncond) * guidance_scale + uncond))
    }

    /// Samples one token id per batch row from the `k` most likely tokens.
    pub fn sample_top_k<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> Result<Vec<i64>> {
        let mut result = Vec::with_capacity(self.0.dim().0);

        for row in self.0.axis_iter(Axis(0)) {
            let k = k.clamp(1, row.len().max(1));

            let mut ranked: Vec<(i64, f32)> = row
                .iter()
                .enumerate()
                .map(|(i, &logit)| (i as i64, logit))
                .collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            ranked.truncate(k);

            // Softmax over the kept logits; the full-vocabulary normalizer
            // cancels out when sampling among them.
            let max = ranked.first().map(|e| e.1).unwrap_or(0.0);
            let weights = ranked.iter().map(|e| (e.1 - max).exp());

            let distribution = WeightedIndex::new(weights).map_err(|e| {
                GeneratorError::model_inference_failed(format!(
                    "Could not build sampling distribution: {}",
                    e
                ))
            })?;

            result.push(ranked[distribution.sample(rng)].0);
        }

        Ok(result)
    }
}
