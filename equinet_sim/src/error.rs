//! Simulator error types.

use equinet_core::{AgentId, InferenceError, InferenceFailure, PatternError, TopologyError};
use thiserror::Error;

/// Malformed run configuration. Always raised before the first step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Fault window targets unknown agent {agent} ({num_agents} agents)")]
    UnknownAgent { agent: AgentId, num_agents: usize },

    /// Step 0 is the initial state; the first simulated step is 1
    #[error("Fault window on agent {agent} starts at step 0")]
    StartAtZero { agent: AgentId },

    #[error("Fault window on agent {agent} at step {start} overflows with duration {duration}")]
    WindowOverflow {
        agent: AgentId,
        start: u64,
        duration: u64,
    },

    #[error("Fault windows on agent {agent} overlap: starts {first} and {second}")]
    OverlappingWindows {
        agent: AgentId,
        first: u64,
        second: u64,
    },

    #[error("Initial state has {found} agents, topology has {expected}")]
    InitialStateWidth { expected: usize, found: usize },
}

/// Anything that can go wrong wiring a scenario together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Inference failure: {0}")]
    InferenceFailure(#[from] InferenceFailure),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The topology cannot host the scenario (e.g. no follower to fault)
    #[error("Scenario setup error: {0}")]
    Setup(String),
}

impl BuildError {
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }
}
