//! Seeded source for the randomized parts of the server scenario.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smallest cache lifetime / ranking period, in seconds.
pub const MIN_PERIOD_SECS: u64 = 300;
/// Largest cache lifetime / ranking period (30 days), in seconds.
pub const MAX_PERIOD_SECS: u64 = 2_592_000;

/// Random draws for one run. Replaying a seed replays every draw.
#[derive(Debug, Clone)]
pub struct WorkloadRng {
    seed: u64,
    rng: StdRng,
}

impl WorkloadRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed from `seed` if given, otherwise from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        Self::from_seed(seed.unwrap_or_else(rand::random))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Multiple of 300 in `[300, 2592000]`, used for `max-age` and `period`.
    pub fn period_secs(&mut self) -> u64 {
        let raw = self.rng.gen_range(MIN_PERIOD_SECS..=MAX_PERIOD_SECS);
        raw - raw % MIN_PERIOD_SECS
    }

    /// Per-run deletion threshold in `[100, 899]` (per mille).
    pub fn deletion_threshold(&mut self) -> u32 {
        self.rng.gen_range(100..=899)
    }

    /// Per-article draw: delete when this returns `true`.
    pub fn should_delete(&mut self, threshold: u32) -> bool {
        self.rng.gen_range(0..=999) < threshold
    }
}
