//! EquiNet Core - strategy inference and cycle topology for binary agent networks
//!
//! Given a periodic N×T bit pattern, this library recovers a minimal local
//! rule per agent and the dependency cycles those rules form:
//! 1. **Patterns**: validated bit matrices, plus the sliding-window and
//!    equitable-graph generators
//! 2. **Inference**: per-agent subset search for a consistent key table
//! 3. **Topology**: cycle detection over dependency edges and per-cycle
//!    "ones" targets that a runtime can stabilize against
//!
//! # Pipeline
//!
//! ```text
//!  PatternSource ──► Pattern ──► StrategyInference ──► Vec<InferredStrategy>
//!                       │                                      │
//!                       │ initial_state            dependency_edges
//!                       │                                      │
//!                       └──────────────► Topology ◄── CycleDetector
//! ```

pub mod cycles;
pub mod equitable;
pub mod error;
pub mod generator;
pub mod inference;
pub mod pattern;
pub mod topology;
pub mod types;

// Re-export key types for convenience
pub use cycles::{CycleDetector, SccCycleDetector};
pub use equitable::EquitableGraph;
pub use error::{InferenceError, InferenceFailure, PatternError, TopologyError};
pub use generator::{gcd, SlidingWindow};
pub use inference::{
    CandidateNeighbors, FailurePolicy, InferenceConfig, InferenceReport, InferredStrategy,
    StrategyInference,
};
pub use pattern::{Pattern, PatternSource};
pub use topology::{dependency_edges, Cycle, Topology, TopologyAgent};
pub use types::{
    count_ones, parse_bits, render_bits, AgentId, Bit, CycleId, KeyedRule, ObservationKey, Rule,
};
