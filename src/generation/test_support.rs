//! In-memory stand-ins for the tokenizer and the ONNX model.

use std::sync::{Arc, Mutex};

use ndarray::{Array2, Array3};

use crate::error::{GeneratorError, Result};
use crate::models::{AudioModel, EncodedBatch, TextProcessor};

pub const FAKE_SAMPLE_RATE: u32 = 32_000;

/// `(rows, max_new_tokens)` for every call a fake model received.
pub type CallLog = Arc<Mutex<Vec<(usize, usize)>>>;

/// A batch of `rows` three-token prompts with distinct ids per row.
pub fn batch_of(rows: usize) -> EncodedBatch {
    let ids = Array2::from_shape_fn((rows, 3), |(r, c)| (r * 10 + c) as i64);
    let mask = Array2::ones((rows, 3));
    EncodedBatch {
        input_ids: ids,
        attention_mask: mask,
    }
}

enum Behaviour {
    Succeed,
    Fail(String),
    Panic,
}

/// Produces two mono samples per token, derived only from the row's ids, so
/// output is independent of which replica ran the row.
pub struct FakeModel {
    behaviour: Behaviour,
    calls: CallLog,
}

impl FakeModel {
    pub fn new() -> Self {
        Self {
            behaviour: Behaviour::Succeed,
            calls: CallLog::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            behaviour: Behaviour::Fail(message.to_string()),
            ..Self::new()
        }
    }

    pub fn panicking() -> Self {
        Self {
            behaviour: Behaviour::Panic,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

impl AudioModel for FakeModel {
    fn generate(&mut self, inputs: &EncodedBatch, max_new_tokens: usize) -> Result<Array3<f32>> {
        self.calls
            .lock()
            .unwrap()
            .push((inputs.batch_size(), max_new_tokens));

        match &self.behaviour {
            Behaviour::Succeed => {}
            Behaviour::Fail(message) => {
                return Err(GeneratorError::model_inference_failed(message.clone()))
            }
            Behaviour::Panic => panic!("fake model exploded"),
        }

        let samples = max_new_tokens * 2;
        Ok(Array3::from_shape_fn(
            (inputs.batch_size(), 1, samples),
            |(row, _, t)| {
                let first_id = inputs.input_ids[[row, 0]] as f32;
                ((first_id + t as f32) * 0.01).sin() * 0.5
            },
        ))
    }

    fn sample_rate(&self) -> u32 {
        FAKE_SAMPLE_RATE
    }
}

/// Tokenizes by characters; prompts longer than the batch's longest are
/// padded with id 0 and mask 0.
pub struct FakeProcessor;

impl TextProcessor for FakeProcessor {
    fn encode(&self, prompts: &[&str]) -> Result<EncodedBatch> {
        let seq_len = prompts.iter().map(|p| p.chars().count()).max().unwrap_or(0);
        if seq_len == 0 {
            return Err(GeneratorError::invalid_input("prompt produced no tokens"));
        }

        let mut ids = Array2::zeros((prompts.len(), seq_len));
        let mut mask = Array2::zeros((prompts.len(), seq_len));
        for (row, prompt) in prompts.iter().enumerate() {
            for (col, ch) in prompt.chars().enumerate() {
                ids[[row, col]] = ch as i64;
                mask[[row, col]] = 1;
            }
        }
        EncodedBatch::new(ids, mask)
    }
}
