//! Seeded random number generation for simulation runs.
//!
//! Every run owns exactly one [`SimRng`]. Scheduling tie-breaks, identifier
//! generation, and all fuzzing decisions draw from it, so two runs built from
//! the same seed consume the same stream in the same order. There is no
//! process-wide generator: consumers receive an explicit `&mut SimRng`.

use std::ops::Range;

use rand::distr::{Distribution, StandardUniform, uniform::SampleUniform};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Snapshot of a [`SimRng`] position.
///
/// The seed plus the ChaCha word position fully determine every subsequent
/// draw. Restoring a snapshot with [`SimRng::from_state`] reproduces the
/// remaining sequence exactly, which is what step-by-step replay relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RngState {
    /// Seed the generator was created from.
    pub seed: u64,
    /// Number of 32-bit words consumed from the keystream.
    pub word_pos: u128,
}

/// Deterministic random number generator owned by a single simulation run.
///
/// Uses `ChaCha8Rng` for reproducible randomness across platforms.
#[derive(Debug, Clone)]
pub struct SimRng {
    seed: u64,
    rng: ChaCha8Rng,
    draws: u64,
}

impl SimRng {
    /// Create a generator for the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            draws: 0,
        }
    }

    /// Recreate a generator positioned exactly at a previously captured state.
    pub fn from_state(state: RngState) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(state.seed);
        rng.set_word_pos(state.word_pos);
        Self {
            seed: state.seed,
            rng,
            draws: 0,
        }
    }

    /// The seed this generator was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of draws made through this handle.
    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    /// Capture the current position of the stream.
    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            word_pos: self.rng.get_word_pos(),
        }
    }

    /// Generate a random value of type `T`.
    pub fn random<T>(&mut self) -> T
    where
        StandardUniform: Distribution<T>,
    {
        self.draws += 1;
        self.rng.sample(StandardUniform)
    }

    /// Generate a random value within `range` (exclusive upper bound).
    ///
    /// # Panics
    ///
    /// Panics if the range is empty. Use [`random_range_or_default`](Self::random_range_or_default)
    /// when the range may be empty.
    pub fn random_range<T>(&mut self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd,
    {
        self.draws += 1;
        self.rng.random_range(range)
    }

    /// Generate a random value in range or return the start value if the range is empty.
    pub fn random_range_or_default<T>(&mut self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd + Clone,
    {
        if range.start >= range.end {
            range.start
        } else {
            self.random_range(range)
        }
    }

    /// Generate an `f64` in `[0.0, 1.0)`.
    pub fn random_ratio(&mut self) -> f64 {
        self.random::<f64>()
    }

    /// Bernoulli trial with the given probability of returning `true`.
    ///
    /// Always consumes one draw, even for probabilities of exactly 0 or 1,
    /// so the stream position does not depend on configuration values.
    /// Probabilities outside `[0, 1]` (and NaN) are clamped.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        let roll = self.random_ratio();
        if probability.is_nan() {
            return false;
        }
        roll < probability.clamp(0.0, 1.0)
    }

    /// Pick an index in `0..len`. Returns 0 for `len <= 1` without drawing.
    pub fn choose_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            0
        } else {
            self.random_range(0..len)
        }
    }

    /// Pick one element of a non-empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.choose_index(items.len());
        items.get(index)
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        self.draws += 1;
        items.shuffle(&mut self.rng);
    }

    /// Generate a synthetic identifier such as `res_3fa1c09b2d7e`.
    ///
    /// `hex_len` is capped at 16 characters (one `u64` draw).
    pub fn generate_id(&mut self, prefix: &str, hex_len: usize) -> String {
        let hex_len = hex_len.clamp(1, 16);
        let bits = self.random::<u64>();
        let masked = if hex_len == 16 {
            bits
        } else {
            bits & ((1u64 << (hex_len * 4)) - 1)
        };
        format!("{prefix}_{masked:0width$x}", width = hex_len)
    }
}
