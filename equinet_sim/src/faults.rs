//! Fault windows and the per-step transitions they trigger.
//!
//! A window `(agent, start, duration)` takes the agent Down at step `start`
//! and brings it back Online (in correcting mode) at `start + duration`.
//! A zero-duration window is a blip: the agent never misses a step but still
//! runs one corrective evaluation.
//!
//! Within one step transitions apply in the order recover, fail, blip, so a
//! window starting exactly where the previous one ends chains into a fresh
//! outage.

use crate::error::ConfigError;
use equinet_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One scheduled outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaultWindow {
    pub agent: AgentId,
    pub start: u64,
    pub duration: u64,
}

impl FaultWindow {
    pub fn new(agent: AgentId, start: u64, duration: u64) -> Self {
        Self {
            agent,
            start,
            duration,
        }
    }

    /// A zero-duration window.
    pub fn blip(agent: AgentId, start: u64) -> Self {
        Self::new(agent, start, 0)
    }

    pub fn is_blip(&self) -> bool {
        self.duration == 0
    }

    /// Step at which the agent comes back, if representable.
    pub fn recovery_step(&self) -> Option<u64> {
        self.start.checked_add(self.duration)
    }

    /// End (exclusive) of the steps this window claims; a blip claims its
    /// start step.
    fn occupied_end(&self) -> Option<u64> {
        self.start.checked_add(self.duration.max(1))
    }
}

/// State change an agent undergoes at the start of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Online and correcting after an outage
    Recover,
    /// Down until the window ends
    Fail,
    /// Zero-length outage: stays Online, starts correcting
    Blip,
}

/// All fault windows of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSchedule {
    windows: Vec<FaultWindow>,
}

impl FaultSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps windows as given; call [`FaultSchedule::validate`] before use.
    pub fn from_windows(windows: Vec<FaultWindow>) -> Self {
        Self { windows }
    }

    /// Adds a window (builder style).
    pub fn with_window(mut self, window: FaultWindow) -> Self {
        self.windows.push(window);
        self
    }

    pub fn push(&mut self, window: FaultWindow) {
        self.windows.push(window);
    }

    pub fn windows(&self) -> &[FaultWindow] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Rejects unknown agents, windows at step 0, overflowing windows and
    /// overlapping windows on the same agent.
    pub fn validate(&self, num_agents: usize) -> Result<(), ConfigError> {
        let mut per_agent: BTreeMap<AgentId, Vec<&FaultWindow>> = BTreeMap::new();

        for window in &self.windows {
            if window.agent >= num_agents {
                return Err(ConfigError::UnknownAgent {
                    agent: window.agent,
                    num_agents,
                });
            }
            if window.start == 0 {
                return Err(ConfigError::StartAtZero {
                    agent: window.agent,
                });
            }
            if window.occupied_end().is_none() {
                return Err(ConfigError::WindowOverflow {
                    agent: window.agent,
                    start: window.start,
                    duration: window.duration,
                });
            }
            per_agent.entry(window.agent).or_default().push(window);
        }

        for (agent, mut owned) in per_agent {
            owned.sort_by_key(|w| w.start);
            for pair in owned.windows(2) {
                let (first, second) = (pair[0], pair[1]);
                // occupied_end is checked above
                let first_end = first.occupied_end().unwrap_or(u64::MAX);
                if second.start < first_end {
                    return Err(ConfigError::OverlappingWindows {
                        agent,
                        first: first.start,
                        second: second.start,
                    });
                }
            }
        }
        Ok(())
    }

    /// Transitions due at `step`, recoveries first, then outages, then blips.
    pub fn transitions_at(&self, step: u64) -> Vec<(AgentId, Transition)> {
        let recoveries = self
            .windows
            .iter()
            .filter(|w| !w.is_blip() && w.recovery_step() == Some(step))
            .map(|w| (w.agent, Transition::Recover));
        let failures = self
            .windows
            .iter()
            .filter(|w| !w.is_blip() && w.start == step)
            .map(|w| (w.agent, Transition::Fail));
        let blips = self
            .windows
            .iter()
            .filter(|w| w.is_blip() && w.start == step)
            .map(|w| (w.agent, Transition::Blip));

        recoveries.chain(failures).chain(blips).collect()
    }

    /// Last step at which any window changes an agent's status.
    pub fn last_transition(&self) -> Option<u64> {
        self.windows.iter().filter_map(FaultWindow::recovery_step).max()
    }
}
