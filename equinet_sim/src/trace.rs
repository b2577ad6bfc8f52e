//! Trace and event log produced by a run.

use equinet_core::{count_ones, render_bits, AgentId, Bit, CycleId, ObservationKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An agent observed a key its rule never saw during inference.
///
/// Recorded, never fatal: the agent falls back to a random bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("Agent {agent} observed unseen key '{key}' at step {step}")]
pub struct RuntimeAnomaly {
    pub agent: AgentId,
    pub step: u64,
    pub key: ObservationKey,
}

/// One corrective evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionEvent {
    pub agent: AgentId,
    pub step: u64,
    pub cycle: CycleId,

    /// Cycle tally in the previous committed state
    pub tally: usize,

    pub target: usize,

    /// Whether the action was overridden
    pub flipped: bool,
}

/// Global ones count relative to the fault-free pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Normal,
    Low,
    High,
}

impl Status {
    pub fn classify(ones: usize, expected: usize) -> Self {
        match ones.cmp(&expected) {
            std::cmp::Ordering::Less => Status::Low,
            std::cmp::Ordering::Equal => Status::Normal,
            std::cmp::Ordering::Greater => Status::High,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Status::Normal => "normal",
            Status::Low => "low",
            Status::High => "high",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Committed global state after one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub step: u64,
    pub state: Vec<Bit>,

    /// Ones per cycle, indexed by cycle id
    pub cycle_ones: Vec<usize>,

    /// Agents Down during this step
    pub down: Vec<AgentId>,
}

impl Snapshot {
    /// The state in snapshot format.
    pub fn render(&self) -> String {
        render_bits(&self.state)
    }

    pub fn ones(&self) -> usize {
        count_ones(&self.state)
    }
}

/// Append-only sequence of snapshots; entry 0 is the initial state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    snapshots: Vec<Snapshot>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, step: u64) -> Option<&Snapshot> {
        usize::try_from(step).ok().and_then(|i| self.snapshots.get(i))
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    /// Every step in snapshot format.
    pub fn render(&self) -> Vec<String> {
        self.snapshots.iter().map(Snapshot::render).collect()
    }

    /// Tally of `cycle` at every step.
    pub fn cycle_series(&self, cycle: CycleId) -> Vec<usize> {
        self.snapshots.iter().map(|s| s.cycle_ones[cycle]).collect()
    }
}

/// Runtime events recorded alongside the trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub anomalies: Vec<RuntimeAnomaly>,
    pub corrections: Vec<CorrectionEvent>,
}

impl EventLog {
    /// Number of corrections that overrode the action.
    pub fn flips(&self) -> usize {
        self.corrections.iter().filter(|c| c.flipped).count()
    }
}
