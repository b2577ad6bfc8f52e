//! SimAgent - one binary agent inside the round-based simulator.
//!
//! Composite state is `(Online | Down) × (correcting | stable)`. The agent
//! itself only knows how to read its key out of the previous global state
//! and how to react to fault transitions; the world decides overrides.

use crate::faults::Transition;
use equinet_core::{AgentId, Bit, CycleId, ObservationKey, Rule, TopologyAgent};
use serde::{Deserialize, Serialize};

/// Fault status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultStatus {
    Online,
    Down,
}

/// Result of looking an observation up in the agent's rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The rule covers the key
    Hit(Bit),
    /// Key never seen during inference
    Miss(ObservationKey),
}

/// A simulated agent.
#[derive(Debug, Clone)]
pub struct SimAgent {
    id: AgentId,

    /// Observed neighbours, in key order
    neighbors: Vec<AgentId>,

    rule: Rule,

    /// Cycle membership, if any
    cycle: Option<CycleId>,

    /// Last committed state
    state: Bit,

    status: FaultStatus,

    /// Pending corrective evaluation
    correcting: bool,
}

impl SimAgent {
    /// Creates an Online, stable agent from its topology entry.
    pub fn new(node: &TopologyAgent, initial: Bit) -> Self {
        Self {
            id: node.id,
            neighbors: node.neighbors.clone(),
            rule: node.rule.clone(),
            cycle: node.cycle,
            state: initial,
            status: FaultStatus::Online,
            correcting: false,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn neighbors(&self) -> &[AgentId] {
        &self.neighbors
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn cycle(&self) -> Option<CycleId> {
        self.cycle
    }

    pub fn state(&self) -> Bit {
        self.state
    }

    pub fn status(&self) -> FaultStatus {
        self.status
    }

    pub fn is_down(&self) -> bool {
        self.status == FaultStatus::Down
    }

    pub fn is_correcting(&self) -> bool {
        self.correcting
    }

    /// Builds the observation key from the previous global state.
    pub fn observe(&self, previous: &[Bit]) -> ObservationKey {
        ObservationKey::from_bits(self.neighbors.iter().map(|&b| previous[b]))
    }

    /// Evaluates the rule against the previous global state.
    pub fn evaluate(&self, previous: &[Bit]) -> RuleOutcome {
        let key = self.observe(previous);
        match self.rule.apply(key) {
            Some(bit) => RuleOutcome::Hit(bit),
            None => RuleOutcome::Miss(key),
        }
    }

    /// Applies a scheduled fault transition.
    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Fail => self.status = FaultStatus::Down,
            Transition::Recover | Transition::Blip => {
                self.status = FaultStatus::Online;
                self.correcting = true;
            }
        }
    }

    pub(crate) fn set_correcting(&mut self, correcting: bool) {
        self.correcting = correcting;
    }

    pub(crate) fn commit(&mut self, state: Bit) {
        self.state = state;
    }
}
