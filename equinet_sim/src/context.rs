//! Simulation context: deterministic seed derivation.
//!
//! One master seed fans out into independent per-subsystem generators, so
//! extra draws in one subsystem (say, a longer inference shuffle) never
//! perturb another subsystem's stream.
//!
//! ```text
//!              master seed
//!       ┌───────────┼───────────┐
//!       ▼           ▼           ▼
//!    pattern    inference    runtime
//!  (permutes)   (shuffles)  (anomalies, Down agents)
//! ```

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const PATTERN_SALT: u64 = 0x517c_c1b7_2722_0a95;
const INFERENCE_SALT: u64 = 0x3c6e_f372_fe94_f82b;
const RUNTIME_SALT: u64 = 0xbb67_ae85_84ca_a73b;

/// Seed fan-out for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimContext {
    /// Master seed for this run
    seed: u64,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Derives a subsystem seed by multiplicative hashing.
    pub fn derive_seed(&self, salt: u64) -> u64 {
        (self.seed ^ salt).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    }

    /// Generator for pattern permutations.
    pub fn pattern_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.derive_seed(PATTERN_SALT))
    }

    /// Generator for the inference subset shuffle.
    pub fn inference_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.derive_seed(INFERENCE_SALT))
    }

    /// Generator for runtime random bits.
    pub fn runtime_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.derive_seed(RUNTIME_SALT))
    }
}
