//! Generated audio handed back to callers.

use ndarray::{Array3, ArrayView1, Axis};

/// Audio produced by one generation call.
///
/// The samples are laid out `[batch, channels, samples]`, the layout the
/// EnCodec decoder produces. A single prompt yields a batch of one.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    audio: Array3<f32>,
    sample_rate: u32,
}

impl Waveform {
    /// Wraps a decoded audio array.
    pub fn new(audio: Array3<f32>, sample_rate: u32) -> Self {
        Self { audio, sample_rate }
    }

    /// The raw `[batch, channels, samples]` array.
    pub fn audio(&self) -> &Array3<f32> {
        &self.audio
    }

    /// Takes ownership of the raw array.
    pub fn into_array(self) -> Array3<f32> {
        self.audio
    }

    pub fn shape(&self) -> [usize; 3] {
        let (b, c, s) = self.audio.dim();
        [b, c, s]
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn batch_size(&self) -> usize {
        self.audio.len_of(Axis(0))
    }

    pub fn channels(&self) -> usize {
        self.audio.len_of(Axis(1))
    }

    /// Samples per channel.
    pub fn num_samples(&self) -> usize {
        self.audio.len_of(Axis(2))
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    /// Duration in seconds of one channel.
    pub fn duration_secs(&self) -> f32 {
        self.num_samples() as f32 / self.sample_rate as f32
    }

    /// One channel of one batch entry, if it exists.
    pub fn channel(&self, batch: usize, channel: usize) -> Option<ArrayView1<'_, f32>> {
        if batch >= self.batch_size() || channel >= self.channels() {
            return None;
        }
        Some(self.audio.index_axis(Axis(0), batch).index_axis_move(Axis(0), channel))
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.audio.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}
