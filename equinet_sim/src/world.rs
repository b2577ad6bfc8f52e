//! SimWorld - the synchronous, self-stabilizing step engine.
//!
//! Every step reads only the previous committed state:
//!
//! ```text
//!   t-1 committed ──┬─► fault transitions (recover, fail, blip)
//!                   ├─► rule evaluation   (miss => random bit + anomaly)
//!                   ├─► Down override     (random bit)
//!                   ├─► correction        (tally(t-1) vs target_ones)
//!                   ▼
//!   t committed  ◄── commit all agents at once, refresh tallies
//! ```

use crate::agent::{RuleOutcome, SimAgent};
use crate::context::SimContext;
use crate::error::ConfigError;
use crate::faults::FaultSchedule;
use crate::trace::{CorrectionEvent, EventLog, RuntimeAnomaly, Snapshot, Status, Trace};
use equinet_core::{count_ones, Bit, Topology};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How long a recovered agent keeps correcting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionPolicy {
    /// One evaluation per recovery, flipped or not.
    #[default]
    SingleShot,
    /// Keep evaluating until the previous tally equals the target.
    UntilStable,
}

impl CorrectionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            CorrectionPolicy::SingleShot => "single_shot",
            CorrectionPolicy::UntilStable => "until_stable",
        }
    }
}

impl fmt::Display for CorrectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CorrectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_shot" | "singleshot" | "single" => Ok(CorrectionPolicy::SingleShot),
            "until_stable" | "untilstable" | "stable" => Ok(CorrectionPolicy::UntilStable),
            _ => Err(format!("Unknown correction policy: {}", s)),
        }
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Steps to run after the initial state
    pub steps: u64,

    pub correction: CorrectionPolicy,

    /// Overrides the pattern's step-0 state
    pub initial_state: Option<Vec<Bit>>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            steps: 50,
            correction: CorrectionPolicy::SingleShot,
            initial_state: None,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_correction(mut self, correction: CorrectionPolicy) -> Self {
        self.correction = correction;
        self
    }

    pub fn with_initial_state(mut self, state: Vec<Bit>) -> Self {
        self.initial_state = Some(state);
        self
    }
}

/// The simulation world.
pub struct SimWorld {
    config: SimConfig,
    topology: Topology,
    schedule: FaultSchedule,
    agents: Vec<SimAgent>,

    /// Runtime randomness (anomaly fallbacks, Down agents)
    rng: ChaCha8Rng,

    /// Last committed step
    step: u64,

    /// Last committed global state
    state: Vec<Bit>,

    /// Ones per cycle in `state`
    tallies: Vec<usize>,

    /// Global ones of the fault-free pattern at step 0
    expected_ones: usize,

    trace: Trace,
    events: EventLog,
}

impl SimWorld {
    /// Creates a world, validating the schedule and any initial-state override.
    pub fn new(
        topology: Topology,
        schedule: FaultSchedule,
        config: SimConfig,
    ) -> Result<Self, ConfigError> {
        let n = topology.num_agents();
        schedule.validate(n)?;

        let state = match &config.initial_state {
            Some(state) if state.len() != n => {
                return Err(ConfigError::InitialStateWidth {
                    expected: n,
                    found: state.len(),
                });
            }
            Some(state) => state.clone(),
            None => topology.initial_state().to_vec(),
        };

        let agents = topology
            .agents()
            .iter()
            .zip(&state)
            .map(|(node, &bit)| SimAgent::new(node, bit))
            .collect();

        let tallies = topology.cycles().iter().map(|c| c.tally(&state)).collect();
        let expected_ones = topology.initial_ones();
        let rng = SimContext::new(config.seed).runtime_rng();

        let mut world = Self {
            config,
            topology,
            schedule,
            agents,
            rng,
            step: 0,
            state,
            tallies,
            expected_ones,
            trace: Trace::new(),
            events: EventLog::default(),
        };
        world.record();

        debug!(
            "SimWorld ready: {} agents, {} cycles, {} fault windows",
            n,
            world.topology.cycles().len(),
            world.schedule.len()
        );
        Ok(world)
    }

    /// Advances one step and returns the committed snapshot.
    pub fn step(&mut self) -> &Snapshot {
        let t = self.step + 1;

        for (agent, transition) in self.schedule.transitions_at(t) {
            debug!("Step {}: agent {} {:?}", t, agent, transition);
            self.agents[agent].apply(transition);
        }

        let cycles = self.topology.cycles();
        let mut next = Vec::with_capacity(self.agents.len());

        for agent in self.agents.iter_mut() {
            let mut action = match agent.evaluate(&self.state) {
                RuleOutcome::Hit(bit) => bit,
                RuleOutcome::Miss(key) => {
                    let anomaly = RuntimeAnomaly {
                        agent: agent.id(),
                        step: t,
                        key,
                    };
                    warn!("{}", anomaly);
                    self.events.anomalies.push(anomaly);
                    Bit::random(&mut self.rng)
                }
            };

            if agent.is_down() {
                action = Bit::random(&mut self.rng);
            } else if agent.is_correcting() {
                match agent.cycle() {
                    None => agent.set_correcting(false),
                    Some(cycle) => {
                        let tally = self.tallies[cycle];
                        let target = cycles[cycle].target_ones;
                        let flipped = (tally < target && action == Bit::Zero)
                            || (tally > target && action == Bit::One);
                        if flipped {
                            action = action.flip();
                        }

                        self.events.corrections.push(CorrectionEvent {
                            agent: agent.id(),
                            step: t,
                            cycle,
                            tally,
                            target,
                            flipped,
                        });
                        debug!(
                            "Step {}: agent {} corrects cycle {} ({}/{}), flipped={}",
                            t,
                            agent.id(),
                            cycle,
                            tally,
                            target,
                            flipped
                        );

                        let keep = match self.config.correction {
                            CorrectionPolicy::SingleShot => false,
                            CorrectionPolicy::UntilStable => tally != target,
                        };
                        agent.set_correcting(keep);
                    }
                }
            }

            next.push(action);
        }

        for (agent, &bit) in self.agents.iter_mut().zip(&next) {
            agent.commit(bit);
        }
        self.tallies = cycles.iter().map(|c| c.tally(&next)).collect();
        self.state = next;
        self.step = t;
        self.record();

        // record() always pushes
        self.trace
            .last()
            .unwrap_or_else(|| unreachable!("trace holds the step just recorded"))
    }

    /// Runs until the configured step budget is spent.
    pub fn run(&mut self) -> &Trace {
        while self.step < self.config.steps {
            self.step();
        }
        info!(
            "Run complete: {} steps, {} anomalies, {} corrections ({} flipped)",
            self.step,
            self.events.anomalies.len(),
            self.events.corrections.len(),
            self.events.flips()
        );
        &self.trace
    }

    fn record(&mut self) {
        let down = self
            .agents
            .iter()
            .filter(|a| a.is_down())
            .map(|a| a.id())
            .collect();
        self.trace.push(Snapshot {
            step: self.step,
            state: self.state.clone(),
            cycle_ones: self.tallies.clone(),
            down,
        });
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn schedule(&self) -> &FaultSchedule {
        &self.schedule
    }

    pub fn agents(&self) -> &[SimAgent] {
        &self.agents
    }

    /// Last committed step (0 before the first step).
    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn state(&self) -> &[Bit] {
        &self.state
    }

    /// Ones per cycle in the current state.
    pub fn tallies(&self) -> &[usize] {
        &self.tallies
    }

    pub fn ones(&self) -> usize {
        count_ones(&self.state)
    }

    /// Global ones count of the fault-free pattern.
    pub fn expected_ones(&self) -> usize {
        self.expected_ones
    }

    pub fn status(&self) -> Status {
        Status::classify(self.ones(), self.expected_ones)
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn anomalies(&self) -> &[RuntimeAnomaly] {
        &self.events.anomalies
    }

    pub fn corrections(&self) -> &[CorrectionEvent] {
        &self.events.corrections
    }
}
