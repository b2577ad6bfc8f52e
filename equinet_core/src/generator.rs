//! Sliding-window pattern generator.
//!
//! A window of `step` ones slides across `N` agents, advancing by `step`
//! positions per time step. The period ends when the window returns to its
//! initial position, i.e. after `N / gcd(N, step)` steps, and every column
//! holds exactly `step` ones.

use crate::error::PatternError;
use crate::pattern::{Pattern, PatternSource};
use crate::types::Bit;
use rand::{Rng, RngCore};

/// Greatest common divisor.
pub fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// Generator for sliding-window patterns with optional seeded permutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    num_agents: usize,
    step: usize,
    permute_agents: bool,
    permute_steps: bool,
}

impl SlidingWindow {
    /// Creates a generator; requires `0 < step <= num_agents`.
    pub fn new(num_agents: usize, step: usize) -> Result<Self, PatternError> {
        if step == 0 || step > num_agents {
            return Err(PatternError::parameters(format!(
                "window {} must be in (0, {}]",
                step, num_agents
            )));
        }
        Ok(Self {
            num_agents,
            step,
            permute_agents: false,
            permute_steps: false,
        })
    }

    /// Swap a random number of agent rows after building the base pattern.
    pub fn with_agent_permutations(mut self, enabled: bool) -> Self {
        self.permute_agents = enabled;
        self
    }

    /// Swap a random number of time steps after building the base pattern.
    ///
    /// Step permutations break the shift structure, so inference may need
    /// much larger neighbour sets (or fail) on the result.
    pub fn with_step_permutations(mut self, enabled: bool) -> Self {
        self.permute_steps = enabled;
        self
    }

    /// Steps until the window returns to its starting position.
    pub fn period(&self) -> usize {
        self.num_agents / gcd(self.num_agents, self.step)
    }

    fn base_rows(&self) -> Vec<Vec<Bit>> {
        let n = self.num_agents;
        let period = self.period();
        (0..n)
            .map(|agent| {
                (0..period)
                    .map(|t| {
                        let offset = (t * self.step) % n;
                        Bit::from((agent + n - offset) % n < self.step)
                    })
                    .collect()
            })
            .collect()
    }

    /// Generates `count` independent patterns from one generator.
    pub fn generate_many(
        &self,
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Pattern>, PatternError> {
        (0..count).map(|_| self.generate(rng)).collect()
    }
}

impl PatternSource for SlidingWindow {
    fn generate(&self, rng: &mut dyn RngCore) -> Result<Pattern, PatternError> {
        let mut rows = self.base_rows();
        let n = self.num_agents;

        if self.permute_agents {
            let swaps = rng.gen_range(0..n);
            for _ in 0..swaps {
                let a = rng.gen_range(0..n);
                let b = rng.gen_range(0..n);
                rows.swap(a, b);
            }
        }

        if self.permute_steps {
            let period = self.period();
            let swaps = rng.gen_range(0..period);
            for _ in 0..swaps {
                let a = rng.gen_range(0..period);
                let b = rng.gen_range(0..period);
                for row in rows.iter_mut() {
                    row.swap(a, b);
                }
            }
        }

        Pattern::new(rows)
    }
}
