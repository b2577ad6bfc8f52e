//! Construction-time error types.

use crate::types::{AgentId, CycleId};
use thiserror::Error;

/// Errors raised while building or loading a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The matrix has no agents or no time steps
    #[error("Pattern is empty")]
    Empty,

    /// Rows of different lengths
    #[error("Agent {agent} has {found} steps, expected {expected}")]
    Ragged {
        agent: AgentId,
        expected: usize,
        found: usize,
    },

    /// A character other than '0' or '1'
    #[error("Agent {agent} has invalid bit {found:?} at step {step}")]
    InvalidBit {
        agent: AgentId,
        step: usize,
        found: char,
    },

    /// Generator parameters out of range
    #[error("Invalid generator parameters: {0}")]
    InvalidParameters(String),

    /// Pattern file could not be parsed
    #[error("Pattern JSON error: {0}")]
    Json(String),
}

impl PatternError {
    pub fn parameters(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}

/// No consistent rule exists for an agent within its candidate neighbours.
///
/// Reported per agent; inference for the remaining agents continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No consistent rule for agent {agent} within {candidates} candidate neighbours")]
pub struct InferenceFailure {
    pub agent: AgentId,
    pub candidates: usize,
}

/// Malformed inference input. Fatal for the whole inference call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("Candidate lists cover {found} agents, pattern has {expected}")]
    CandidateCountMismatch { expected: usize, found: usize },

    #[error("Agent {agent} lists unknown candidate neighbour {neighbor}")]
    UnknownCandidate { agent: AgentId, neighbor: AgentId },

    #[error("Agent {agent} has {count} candidate neighbours, at most {max} supported")]
    TooManyCandidates {
        agent: AgentId,
        count: usize,
        max: usize,
    },
}

/// Invalid topology. Always raised before any simulation step runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Agent {agent} belongs to cycles {first} and {second}")]
    MultipleCycles {
        agent: AgentId,
        first: CycleId,
        second: CycleId,
    },

    #[error("Cycle {cycle} lists agent {agent} twice")]
    DuplicateMember { cycle: CycleId, agent: AgentId },

    #[error("Cycle {cycle} references unknown agent {agent}")]
    UnknownAgent { cycle: CycleId, agent: AgentId },

    #[error("Agent {agent} observes unknown neighbour {neighbor}")]
    UnknownNeighbor { agent: AgentId, neighbor: AgentId },

    #[error("Cycle {cycle} has no members")]
    EmptyCycle { cycle: CycleId },

    #[error("Cycle {cycle} targets {target} ones with only {members} members")]
    TargetExceedsCycle {
        cycle: CycleId,
        target: usize,
        members: usize,
    },

    #[error("Strategy at position {position} belongs to agent {agent}")]
    MisindexedStrategy { position: usize, agent: AgentId },

    #[error("Cycle at position {position} carries id {cycle}")]
    MisindexedCycle { position: usize, cycle: CycleId },

    #[error("Agent {agent} claims cycle {cycle} but is not a member")]
    StrayAssignment { agent: AgentId, cycle: CycleId },

    #[error("Agent {agent} has a rule keyed on {width} bits but observes {neighbors} neighbours")]
    RuleWidthMismatch {
        agent: AgentId,
        width: usize,
        neighbors: usize,
    },

    #[error("Agent {agent} observes {count} neighbours, at most {max} supported")]
    TooManyNeighbors {
        agent: AgentId,
        count: usize,
        max: usize,
    },

    #[error("Initial state has {found} agents, topology has {expected}")]
    WidthMismatch { expected: usize, found: usize },
}
