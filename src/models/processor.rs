//! Prompt processing: text to padded token batches.

use std::path::Path;

use ndarray::{s, Array2, ArrayView1, Axis};
use tokenizers::{PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer};

use crate::error::{GeneratorError, Result};

/// Token ids and attention mask for a batch of prompts.
///
/// Both arrays have shape `[batch, seq_len]`; padded positions have a mask of 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
}

impl EncodedBatch {
    /// Builds a batch, checking that ids and mask agree in shape.
    pub fn new(input_ids: Array2<i64>, attention_mask: Array2<i64>) -> Result<Self> {
        if input_ids.dim() != attention_mask.dim() {
            return Err(GeneratorError::invalid_input(format!(
                "input_ids {:?} and attention_mask {:?} differ in shape",
                input_ids.dim(),
                attention_mask.dim()
            )));
        }
        Ok(Self {
            input_ids,
            attention_mask,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.input_ids.len_of(Axis(0))
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.len_of(Axis(1))
    }

    /// Ids and mask of one row.
    pub fn row(&self, index: usize) -> (ArrayView1<'_, i64>, ArrayView1<'_, i64>) {
        (
            self.input_ids.row(index),
            self.attention_mask.row(index),
        )
    }

    /// Splits the rows into at most `parts` contiguous chunks of
    /// `ceil(batch / parts)` rows each.
    ///
    /// A batch smaller than `parts` yields fewer chunks, one row each.
    pub fn scatter(&self, parts: usize) -> Vec<EncodedBatch> {
        let batch = self.batch_size();
        if batch == 0 || parts == 0 {
            return Vec::new();
        }
        let chunk = batch.div_ceil(parts);

        (0..batch)
            .step_by(chunk)
            .map(|start| {
                let end = (start + chunk).min(batch);
                EncodedBatch {
                    input_ids: self.input_ids.slice(s![start..end, ..]).to_owned(),
                    attention_mask: self.attention_mask.slice(s![start..end, ..]).to_owned(),
                }
            })
            .collect()
    }
}

/// Turns prompt text into model-ready token batches.
pub trait TextProcessor: Send {
    /// Encodes prompts into one padded batch.
    fn encode(&self, prompts: &[&str]) -> Result<EncodedBatch>;
}

/// Tokenizer-backed processor for MusicGen's T5 text encoder.
pub struct MusicGenProcessor {
    tokenizer: Tokenizer,
}

impl MusicGenProcessor {
    /// Loads `tokenizer.json` from the model directory with padding enabled.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            GeneratorError::model_load_failed(format!("Failed to load tokenizer: {}", e))
        })?;

        Self::from_tokenizer(tokenizer)
    }

    /// Wraps an already constructed tokenizer.
    ///
    /// Padding is set to the longest prompt of each batch, keeping the
    /// tokenizer's own pad token when it declares one. Truncation is disabled.
    pub fn from_tokenizer(mut tokenizer: Tokenizer) -> Result<Self> {
        let padding = batch_longest_padding(tokenizer.get_padding());

        tokenizer
            .with_padding(Some(padding))
            .with_truncation(None)
            .map_err(|e| {
                GeneratorError::model_load_failed(format!("Failed to configure tokenizer: {}", e))
            })?;

        Ok(Self { tokenizer })
    }
}

/// Right padding to the longest row of each batch.
///
/// Only the pad token, id and type id are taken from the tokenizer's own
/// settings; without them T5's `<pad>` with id 0 is used.
fn batch_longest_padding(existing: Option<&PaddingParams>) -> PaddingParams {
    let (pad_id, pad_type_id, pad_token) = match existing {
        Some(params) => (params.pad_id, params.pad_type_id, params.pad_token.clone()),
        None => (0, 0, "<pad>".to_string()),
    };

    PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        direction: PaddingDirection::Right,
        pad_to_multiple_of: None,
        pad_id,
        pad_type_id,
        pad_token,
    }
}

impl TextProcessor for MusicGenProcessor {
    fn encode(&self, prompts: &[&str]) -> Result<EncodedBatch> {
        if prompts.is_empty() {
            return Err(GeneratorError::invalid_input("no prompts to encode"));
        }

        let encodings = self
            .tokenizer
            .encode_batch(prompts.to_vec(), true)
            .map_err(|e| GeneratorError::invalid_input(format!("Tokenization failed: {}", e)))?;

        let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        if seq_len == 0 {
            return Err(GeneratorError::invalid_input("prompt produced no tokens"));
        }

        let mut ids = Vec::with_capacity(encodings.len() * seq_len);
        let mut mask = Vec::with_capacity(encodings.len() * seq_len);
        for encoding in &encodings {
            ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = (encodings.len(), seq_len);
        let input_ids = Array2::from_shape_vec(shape, ids).map_err(|e| {
            GeneratorError::invalid_input(format!("Ragged token batch: {}", e))
        })?;
        let attention_mask = Array2::from_shape_vec(shape, mask).map_err(|e| {
            GeneratorError::invalid_input(format!("Ragged attention mask: {}", e))
        })?;

        EncodedBatch::new(input_ids, attention_mask)
    }
}
