//! Delay pattern for MusicGen's parallel codebooks.
//!
//! Codebook `i` runs `i` steps behind codebook 0, so the decoder is fed pad
//! tokens for a codebook until it has started, and finished audio frames are
//! read back along the diagonal:
//!
//! ```text
//!   step 0 1 2 3 4 5
//! cb 0   x x x x x x
//! cb 1   P x x x x x
//! cb 2   P P x x x x
//! cb 3   P P P x x x
//! ```

/// Sampled tokens of `N` codebooks, one column per decoder step.
#[derive(Debug, Clone)]
pub struct DelayPattern<const N: usize> {
    codebooks: [Vec<i64>; N],
}

impl<const N: usize> Default for DelayPattern<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DelayPattern<N> {
    pub fn new() -> Self {
        assert!(N > 0, "at least one codebook is required");
        Self {
            codebooks: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Records the tokens sampled for one decoder step.
    pub fn push(&mut self, step: [i64; N]) {
        for (codebook, token) in self.codebooks.iter_mut().zip(step) {
            codebook.push(token);
        }
    }

    /// Decoder input for the next step: the latest token of each codebook
    /// that has started, `pad_token_id` for the rest.
    pub fn next_input(&self, pad_token_id: i64) -> [i64; N] {
        let steps = self.steps();
        std::array::from_fn(|i| {
            if steps > i {
                self.codebooks[i][steps - 1]
            } else {
                pad_token_id
            }
        })
    }

    /// The most recent complete frame, read along the diagonal.
    ///
    /// None until every codebook has produced a token.
    pub fn last_frame(&self) -> Option<[i64; N]> {
        let steps = self.steps();
        if steps < N {
            return None;
        }
        Some(std::array::from_fn(|i| self.codebooks[i][steps - N + i]))
    }

    /// Number of complete frames the recorded steps yield.
    pub fn frames(&self) -> usize {
        (self.steps() + 1).saturating_sub(N)
    }

    /// Number of decoder steps recorded.
    pub fn steps(&self) -> usize {
        self.codebooks[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps() == 0
    }
}
