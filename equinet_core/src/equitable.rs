//! Equitable graph generator: a known-answer topology.
//!
//! `N` agents are split into `n = N / g` twin groups of size `g = gcd(N, s)`.
//! The first agent of each group (the leader) sits on a single ring where
//! every leader copies the previous group's leader. The remaining agents
//! (followers) copy the previous group's leader too, so each follower mirrors
//! its own group's leader exactly.
//!
//! ```text
//!   group:     0          1          2     ...    n-1
//!   leader:   L0  ---->  L1  ---->  L2  ...  ---> L(n-1) --+
//!              ^   \          \                          |
//!              |    +-> f1,f2  +-> f4,f5 ...             |
//!              +---------------------------------------- +
//! ```
//!
//! The first `s / g` leaders start at `1`, so the ring carries `s / g` ones
//! and every global state carries exactly `s` ones.

use crate::error::PatternError;
use crate::generator::gcd;
use crate::inference::InferredStrategy;
use crate::pattern::{Pattern, PatternSource};
use crate::types::{AgentId, Bit, KeyedRule, ObservationKey, Rule};
use rand::RngCore;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquitableGraph {
    num_agents: usize,
    ones: usize,
}

impl EquitableGraph {
    /// Creates a generator; requires `0 < ones <= num_agents`.
    pub fn new(num_agents: usize, ones: usize) -> Result<Self, PatternError> {
        if ones == 0 || ones > num_agents {
            return Err(PatternError::parameters(format!(
                "ones {} must be in (0, {}]",
                ones, num_agents
            )));
        }
        Ok(Self { num_agents, ones })
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    /// Global ones count at every step.
    pub fn ones(&self) -> usize {
        self.ones
    }

    /// Agents per twin group.
    pub fn group_size(&self) -> usize {
        gcd(self.num_agents, self.ones)
    }

    /// Number of leaders on the ring (also the pattern period).
    pub fn ring_length(&self) -> usize {
        self.num_agents / self.group_size()
    }

    /// Ones carried by the ring.
    pub fn ring_ones(&self) -> usize {
        self.ones / self.group_size()
    }

    /// Ring members in ring order.
    pub fn ring_members(&self) -> Vec<AgentId> {
        (0..self.ring_length()).map(|g| g * self.group_size()).collect()
    }

    /// Agents that are not on the ring.
    pub fn followers(&self) -> Vec<AgentId> {
        let g = self.group_size();
        (0..self.num_agents).filter(|a| a % g != 0).collect()
    }

    /// The single agent each agent observes.
    pub fn predecessor(&self, agent: AgentId) -> AgentId {
        let g = self.group_size();
        let n = self.ring_length();
        let group = agent / g;
        ((group + n - 1) % n) * g
    }

    /// Neighbour lists, one entry per agent.
    pub fn neighbors(&self) -> Vec<Vec<AgentId>> {
        (0..self.num_agents).map(|a| vec![self.predecessor(a)]).collect()
    }

    /// The periodic pattern produced by the ring.
    pub fn pattern(&self) -> Pattern {
        let g = self.group_size();
        let period = self.ring_length();
        let ring_ones = self.ring_ones();

        let mut rows: Vec<Vec<Bit>> = (0..self.num_agents)
            .map(|agent| {
                let leader_group = agent / g;
                vec![Bit::from(leader_group < ring_ones)]
            })
            .collect();

        for t in 1..period {
            let next: Vec<Bit> = (0..self.num_agents)
                .map(|a| rows[self.predecessor(a)][t - 1])
                .collect();
            for (row, bit) in rows.iter_mut().zip(next) {
                row.push(bit);
            }
        }

        // Rows are non-empty and equal length by construction
        Pattern::new(rows).unwrap_or_else(|_| unreachable!("equitable pattern is rectangular"))
    }

    /// The generating strategies: every agent copies its predecessor.
    pub fn strategies(&self) -> Vec<InferredStrategy> {
        let pattern = self.pattern();
        (0..self.num_agents)
            .map(|agent| {
                let neighbor = self.predecessor(agent);
                let mut key_counts = BTreeMap::new();
                for t in 0..pattern.period() {
                    let key = ObservationKey::from_bits([pattern.bit(neighbor, t)]);
                    *key_counts.entry(key).or_insert(0) += 1;
                }
                InferredStrategy {
                    agent,
                    neighbors: vec![neighbor],
                    rule: Rule::Keyed(KeyedRule::copy()),
                    key_counts,
                }
            })
            .collect()
    }
}

impl PatternSource for EquitableGraph {
    fn generate(&self, _rng: &mut dyn RngCore) -> Result<Pattern, PatternError> {
        Ok(self.pattern())
    }
}
