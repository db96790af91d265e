//! Decrement draws applied by a token holder

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the amount a holder subtracts from the token
pub trait DecrementSource: Send {
    /// Next decrement, never negative
    fn draw(&mut self) -> i64;
}

/// Uniform draws from `[0, max]` backed by a seeded `StdRng`
#[derive(Debug, Clone)]
pub struct SeededDraw {
    rng: StdRng,
    max: u64,
}

impl SeededDraw {
    /// Create a draw source from a raw seed
    pub fn new(seed: u64, max: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max,
        }
    }

    /// Draw source for the worker at `index`, derived from the run seed
    ///
    /// Two runs with the same seed give every worker the same sequence.
    pub fn for_worker(run_seed: u64, index: usize, max: u64) -> Self {
        Self::new(worker_seed(run_seed, index), max)
    }
}

impl DecrementSource for SeededDraw {
    fn draw(&mut self) -> i64 {
        if self.max == 0 {
            return 0;
        }
        i64::try_from(self.rng.random_range(0..=self.max)).unwrap_or(i64::MAX)
    }
}

/// Mix the run seed with a worker index
pub fn worker_seed(run_seed: u64, index: usize) -> u64 {
    run_seed ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Apply one draw to a received token
pub fn apply_draw(token: i64, draw: i64) -> i64 {
    token.saturating_sub(draw)
}
