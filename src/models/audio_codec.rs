//! Audio codec wrapper for MusicGen.
//!
//! Decodes codebook frames into audio samples using EnCodec.

use std::path::Path;

use half::f16;
use ndarray::{Array, Array3, Ix3, IxDyn};
use ort::session::Session;
use ort::value::{DynValue, Tensor};

use crate::error::{GeneratorError, Result};

use super::decoder::{Frame, CODEBOOKS};
use super::loader::SessionOptions;

/// MusicGen audio codec (EnCodec decoder).
pub struct MusicGenAudioCodec {
    audio_codec: Session,
}

impl MusicGenAudioCodec {
    /// Loads `encodec_decode.onnx` from the directory.
    pub fn load(model_dir: &Path, options: &SessionOptions) -> Result<Self> {
        let audio_codec = options.load_session(&model_dir.join("encodec_decode.onnx"))?;
        Ok(Self { audio_codec })
    }

    /// Decodes frames into audio of shape `[1, channels, samples]`.
    pub fn decode(&mut self, frames: &[Frame]) -> Result<Array3<f32>> {
        if frames.is_empty() {
            return Err(GeneratorError::model_inference_failed(
                "no audio frames were generated",
            ));
        }

        let input_tensor = Tensor::from_array(([1usize, 1, CODEBOOKS, frames.len()], codebook_major(frames)))
            .map_err(|e| {
                GeneratorError::model_inference_failed(format!("Failed to create token tensor: {}", e))
            })?;

        let mut outputs = self
            .audio_codec
            .run(ort::inputs![input_tensor])
            .map_err(|e| {
                GeneratorError::model_inference_failed(format!("Audio codec inference failed: {}", e))
            })?;

        let audio_values: DynValue = outputs.remove("audio_values").ok_or_else(|| {
            GeneratorError::model_inference_failed("audio_values not found in output")
        })?;

        let (shape, data): (Vec<usize>, Vec<f32>) =
            if let Ok((shape, data)) = audio_values.try_extract_tensor::<f32>() {
                (shape.iter().map(|&x| x as usize).collect(), data.to_vec())
            } else if let Ok((shape, data)) = audio_values.try_extract_tensor::<f16>() {
                (
                    shape.iter().map(|&x| x as usize).collect(),
                    data.iter().map(|e| f32::from(*e)).collect(),
                )
            } else {
                return Err(GeneratorError::model_inference_failed(
                    "Audio values must be either f16 or f32",
                ));
            };

        to_batch_channel_samples(shape, data)
    }
}

/// Lays frames out codebook-major: `[cb0 t0, cb0 t1, ..., cb3 tN]`.
fn codebook_major(frames: &[Frame]) -> Vec<i64> {
    let seq_len = frames.len();
    let mut transposed = vec![0i64; seq_len * CODEBOOKS];
    for (t, frame) in frames.iter().enumerate() {
        for (cb, &token) in frame.iter().enumerate() {
            transposed[cb * seq_len + t] = token;
        }
    }
    transposed
}

/// Normalizes codec output to `[batch, channels, samples]`.
///
/// Some exports drop the channel axis for mono audio.
fn to_batch_channel_samples(mut shape: Vec<usize>, data: Vec<f32>) -> Result<Array3<f32>> {
    match shape.len() {
        3 => {}
        2 => shape.insert(1, 1),
        1 => shape = vec![1, 1, shape[0]],
        n => {
            return Err(GeneratorError::model_inference_failed(format!(
                "Unexpected audio_values rank {}",
                n
            )))
        }
    }

    Array::from_shape_vec(IxDyn(&shape), data)
        .and_then(|a| a.into_dimensionality::<Ix3>())
        .map_err(|e| {
            GeneratorError::model_inference_failed(format!("Malformed audio_values: {}", e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_laid_out_codebook_major() {
        let frames = vec![[1i64, 2, 3, 4], [5, 6, 7, 8]];
        assert_eq!(codebook_major(&frames), vec![1, 5, 2, 6, 3, 7, 4, 8]);
    }

    #[test]
    fn mono_output_gets_channel_axis() {
        let audio = to_batch_channel_samples(vec![1, 4], vec![0.0, 0.1, 0.2, 0.3]).unwrap();
        assert_eq!(audio.dim(), (1, 1, 4));

        let flat = to_batch_channel_samples(vec![3], vec![0.0, 0.1, 0.2]).unwrap();
        assert_eq!(flat.dim(), (1, 1, 3));
    }

    #[test]
    fn three_dimensional_output_is_kept() {
        let audio = to_batch_channel_samples(vec![1, 2, 2], vec![0.0; 4]).unwrap();
        assert_eq!(audio.dim(), (1, 2, 2));
    }

    #[test]
    fn bad_rank_is_rejected() {
        assert!(to_batch_channel_samples(vec![1, 1, 1, 2], vec![0.0; 2]).is_err());
    }
}
