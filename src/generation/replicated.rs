//! Single-device and replicated generators.
//!
//! Both implement [`Generator`] with the same output contract: audio of shape
//! `[batch, channels, samples]` for the batch that was passed in. Scattering
//! rows across replicas and gathering their outputs happens entirely inside
//! [`Replicated`].

use std::thread;

use ndarray::{concatenate, Array3, Axis};
use tracing::debug;

use crate::error::{GeneratorError, Result};
use crate::models::{AudioModel, EncodedBatch};

use super::panics;

/// Turns encoded prompt batches into audio.
pub trait Generator: Send {
    /// Generates audio for every row of `inputs`.
    fn generate(&mut self, inputs: &EncodedBatch, max_new_tokens: usize) -> Result<Array3<f32>>;

    /// Number of devices the work is spread across.
    fn device_count(&self) -> usize;

    /// Sample rate of the produced audio in Hz.
    fn sample_rate(&self) -> u32;
}

/// A model on one device.
pub struct SingleDevice<M> {
    model: M,
}

impl<M: AudioModel> SingleDevice<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: AudioModel> Generator for SingleDevice<M> {
    fn generate(&mut self, inputs: &EncodedBatch, max_new_tokens: usize) -> Result<Array3<f32>> {
        self.model.generate(inputs, max_new_tokens)
    }

    fn device_count(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.model.sample_rate()
    }
}

/// One model replica per device, fed contiguous chunks of the batch.
///
/// Chunks hold `ceil(batch / replicas)` rows, so a batch smaller than the
/// replica count leaves the trailing replicas idle. Outputs from all busy
/// replicas are concatenated in replica order; nothing is discarded.
pub struct Replicated<M> {
    replicas: Vec<M>,
}

impl<M: AudioModel> Replicated<M> {
    /// Wraps replicas, primary device first. At least one is required.
    pub fn new(replicas: Vec<M>) -> Result<Self> {
        if replicas.is_empty() {
            return Err(GeneratorError::model_load_failed(
                "replicated generator needs at least one replica",
            ));
        }
        Ok(Self { replicas })
    }
}

impl<M: AudioModel> Generator for Replicated<M> {
    fn generate(&mut self, inputs: &EncodedBatch, max_new_tokens: usize) -> Result<Array3<f32>> {
        let shards = inputs.scatter(self.replicas.len());
        if shards.is_empty() {
            return Err(GeneratorError::invalid_input("empty prompt batch"));
        }
        debug!(
            "Scattering {} rows over {} of {} replicas",
            inputs.batch_size(),
            shards.len(),
            self.replicas.len()
        );

        let outputs: Vec<Result<Array3<f32>>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .replicas
                .iter_mut()
                .zip(shards.iter())
                .enumerate()
                .map(|(index, (replica, shard))| {
                    scope.spawn(move || {
                        panics::capture(|| replica.generate(shard, max_new_tokens))
                            .unwrap_or_else(|message| Err(replica_panicked(index, &message)))
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(replica_panicked(index, "thread aborted")))
                })
                .collect()
        });

        let outputs = outputs.into_iter().collect::<Result<Vec<_>>>()?;
        gather(outputs)
    }

    fn device_count(&self) -> usize {
        self.replicas.len()
    }

    fn sample_rate(&self) -> u32 {
        self.replicas[0].sample_rate()
    }
}

fn replica_panicked(index: usize, message: &str) -> GeneratorError {
    GeneratorError::model_inference_failed(format!(
        "replica {} panicked during generation: {}",
        index, message
    ))
}

/// Merges per-replica outputs along the batch axis.
///
/// With a single busy replica its output is returned as is, which gives a
/// one-prompt batch exactly the single-device shape.
fn gather(mut outputs: Vec<Array3<f32>>) -> Result<Array3<f32>> {
    match outputs.len() {
        0 => Err(GeneratorError::model_inference_failed("no replica produced output")),
        1 => Ok(outputs.swap_remove(0)),
        _ => {
            let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
            concatenate(Axis(0), &views).map_err(|e| {
                GeneratorError::model_inference_failed(format!(
                    "Replica outputs have mismatched shapes: {}",
                    e
                ))
            })
        }
    }
}
