//! Scenario runner - wires pattern, inference, topology and simulation
//! together and checks each scenario's assertions.

use crate::context::SimContext;
use crate::error::BuildError;
use crate::exporter::TraceExport;
use crate::faults::{FaultSchedule, FaultWindow};
use crate::scenarios::ScenarioId;
use crate::world::{CorrectionPolicy, SimConfig, SimWorld};

use equinet_core::{
    AgentId, CandidateNeighbors, Cycle, EquitableGraph, FailurePolicy, InferenceConfig, Pattern,
    PatternSource, SccCycleDetector, SlidingWindow, StrategyInference, Topology,
};
use tracing::{debug, info, warn};

/// First step of the scripted outages.
const FAULT_START: u64 = 4;

/// Length of the scripted outages.
const FAULT_DURATION: u64 = 2;

/// Step of the scripted blip.
const BLIP_STEP: u64 = 3;

/// First step of the follower storm; follower `i` fails at `STORM_START + i`.
const STORM_START: u64 = 2;

const STORM_DURATION: u64 = 3;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Master seed
    pub seed: u64,

    /// Agents in generated patterns
    pub num_agents: usize,

    /// Ones per step in generated patterns
    pub ones: usize,

    /// Steps simulated after the initial state
    pub steps: u64,

    pub correction: CorrectionPolicy,

    pub inference: InferenceConfig,

    /// Observed pattern replacing the generated ones
    pub pattern: Option<Pattern>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 15,
            ones: 9,
            steps: 40,
            correction: CorrectionPolicy::SingleShot,
            inference: InferenceConfig::default(),
            pattern: None,
        }
    }
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Steps executed after the initial state
    pub total_steps: u64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    /// Cycles in the topology
    pub cycles: usize,

    /// Unseen-key events
    pub anomalies: usize,

    /// Corrective evaluations
    pub corrections: usize,

    /// Corrective evaluations that overrode the action
    pub flips: usize,

    /// Agent-steps spent Down
    pub down_steps: usize,

    /// Largest |tally - target| seen on any cycle
    pub max_deviation: usize,

    /// Global ones in the last state
    pub final_ones: usize,
}

impl ScenarioMetrics {
    pub fn collect(world: &SimWorld) -> Self {
        let targets: Vec<usize> = world
            .topology()
            .cycles()
            .iter()
            .map(|c| c.target_ones)
            .collect();
        let max_deviation = world
            .trace()
            .iter()
            .flat_map(|s| s.cycle_ones.iter().zip(&targets).map(|(&ones, &t)| ones.abs_diff(t)))
            .max()
            .unwrap_or(0);

        Self {
            cycles: targets.len(),
            anomalies: world.anomalies().len(),
            corrections: world.corrections().len(),
            flips: world.events().flips(),
            down_steps: world.trace().iter().map(|s| s.down.len()).sum(),
            max_deviation,
            final_ones: world.ones(),
        }
    }
}

/// A finished scenario together with the world that produced it.
pub struct ScenarioRun {
    pub result: ScenarioResult,
    pub world: SimWorld,
}

impl ScenarioRun {
    /// Builds the JSON export of this run.
    pub fn export(&self) -> TraceExport {
        let mut export = TraceExport::from_world(self.result.scenario.name(), &self.world);
        export.finalize(self.result.passed);
        export
    }
}

/// Pattern plus the topology built from it.
struct Fixture {
    pattern: Pattern,
    topology: Topology,
}

/// World plus verdict (`Err` carries the failure reason).
type Outcome = (SimWorld, Result<(), String>);

/// Runs stabilization scenarios.
pub struct ScenarioRunner {
    config: RunnerConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_agents: usize) -> Self {
        Self::from_config(RunnerConfig {
            seed,
            num_agents,
            ..Default::default()
        })
    }

    pub fn from_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Sets the ones per step of generated patterns.
    pub fn with_ones(mut self, ones: usize) -> Self {
        self.config.ones = ones;
        self
    }

    /// Sets the step budget.
    pub fn with_steps(mut self, steps: u64) -> Self {
        self.config.steps = steps;
        self
    }

    /// Sets the correction policy.
    pub fn with_correction(mut self, correction: CorrectionPolicy) -> Self {
        self.config.correction = correction;
        self
    }

    /// Uses an observed pattern (and inference) for every scenario.
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.config.pattern = Some(pattern);
        self
    }

    /// Runs a scenario and returns the result; setup errors count as failures.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        match self.execute(scenario) {
            Ok(run) => run.result,
            Err(e) => {
                warn!("{} setup failed: {}", scenario.name(), e);
                ScenarioResult {
                    scenario,
                    seed: self.config.seed,
                    passed: false,
                    total_steps: 0,
                    failure_reason: Some(format!("Setup failed: {}", e)),
                    metrics: ScenarioMetrics::default(),
                }
            }
        }
    }

    /// Runs a scenario and keeps the world for inspection or export.
    pub fn execute(&self, scenario: ScenarioId) -> Result<ScenarioRun, BuildError> {
        info!(
            "Starting scenario: {} (seed={}, correction={})",
            scenario.name(),
            self.config.seed,
            self.config.correction
        );

        if scenario.has_faults() {
            debug!("{} injects faults: {}", scenario.name(), scenario.description());
        }

        let fixture = self.fixture(scenario)?;
        let (world, verdict) = match scenario {
            ScenarioId::Steady => self.run_steady(&fixture)?,
            ScenarioId::InferredRing => self.run_inferred_ring(&fixture)?,
            ScenarioId::RingFault => self.run_ring_fault(&fixture)?,
            ScenarioId::FollowerFault => self.run_follower_fault(&fixture)?,
            ScenarioId::Blip => self.run_blip(&fixture)?,
            ScenarioId::FollowerStorm => self.run_follower_storm(&fixture)?,
            ScenarioId::Replay => self.run_replay(&fixture)?,
        };
        let verdict = verdict.and_then(|_| faults_as_declared(scenario, &world));

        let result = ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: verdict.is_ok(),
            total_steps: world.current_step(),
            failure_reason: verdict.err(),
            metrics: ScenarioMetrics::collect(&world),
        };
        Ok(ScenarioRun { result, world })
    }

    fn fixture(&self, scenario: ScenarioId) -> Result<Fixture, BuildError> {
        if let Some(pattern) = &self.config.pattern {
            return self.inferred(pattern.clone());
        }

        match scenario {
            ScenarioId::InferredRing => {
                let mut rng = SimContext::new(self.config.seed).pattern_rng();
                let pattern = SlidingWindow::new(self.config.num_agents, self.config.ones)?
                    .with_agent_permutations(true)
                    .generate(&mut rng)?;
                self.inferred(pattern)
            }
            _ => {
                let graph = EquitableGraph::new(self.config.num_agents, self.config.ones)?;
                let pattern = graph.pattern();
                let topology =
                    Topology::from_pattern(graph.strategies(), &pattern, &SccCycleDetector)?;
                Ok(Fixture { pattern, topology })
            }
        }
    }

    /// Infers rules from `pattern` with every agent as a candidate neighbour.
    fn inferred(&self, pattern: Pattern) -> Result<Fixture, BuildError> {
        let mut rng = SimContext::new(self.config.seed).inference_rng();
        let candidates = CandidateNeighbors::all(pattern.num_agents());
        let strategies = StrategyInference::new(self.config.inference.clone())
            .infer(&pattern, &candidates, &mut rng)?
            .into_strategies(FailurePolicy::Abort)?;
        let topology = Topology::from_pattern(strategies, &pattern, &SccCycleDetector)?;
        Ok(Fixture { pattern, topology })
    }

    fn simulate(&self, fixture: &Fixture, schedule: FaultSchedule) -> Result<SimWorld, BuildError> {
        let config = SimConfig::default()
            .with_seed(self.config.seed)
            .with_steps(self.config.steps)
            .with_correction(self.config.correction);
        let mut world = SimWorld::new(fixture.topology.clone(), schedule, config)?;
        world.run();
        Ok(world)
    }

    fn require_steps(&self, needed: u64) -> Result<(), BuildError> {
        if self.config.steps < needed {
            return Err(BuildError::setup(format!(
                "scenario needs at least {} steps, budget is {}",
                needed, self.config.steps
            )));
        }
        Ok(())
    }

    /// EQ-001: fault-free replay of a known-answer ring.
    fn run_steady(&self, fixture: &Fixture) -> Result<Outcome, BuildError> {
        let world = self.simulate(fixture, FaultSchedule::new())?;
        let verdict = matches_pattern(&world, &fixture.pattern, 0).and_then(|_| no_anomalies(&world));
        Ok((world, verdict))
    }

    /// EQ-002: inferred rules must be idempotent on their own pattern.
    fn run_inferred_ring(&self, fixture: &Fixture) -> Result<Outcome, BuildError> {
        let world = self.simulate(fixture, FaultSchedule::new())?;
        info!(
            "Inferred {} cycle(s) over a period of {}",
            fixture.topology.cycles().len(),
            fixture.pattern.period()
        );
        let verdict = cycles_consistent(&fixture.topology)
            .and_then(|_| matches_pattern(&world, &fixture.pattern, 0))
            .and_then(|_| no_anomalies(&world));
        Ok((world, verdict))
    }

    /// EQ-003: outage on a ring member, tally must come back.
    fn run_ring_fault(&self, fixture: &Fixture) -> Result<Outcome, BuildError> {
        let cycle = ring(&fixture.topology)?;
        let member = cycle.members[1 % cycle.len()];
        let recovery = FAULT_START + FAULT_DURATION;
        let deadline = recovery + cycle.len() as u64 - 1;
        self.require_steps(deadline)?;

        let schedule =
            FaultSchedule::new().with_window(FaultWindow::new(member, FAULT_START, FAULT_DURATION));
        let world = self.simulate(fixture, schedule)?;
        let series = world.trace().cycle_series(cycle.id);

        let verdict = on_target(&series, cycle.target_ones, 0, FAULT_START as usize).and_then(|_| {
            match self.config.correction {
                CorrectionPolicy::UntilStable => {
                    on_target(&series, cycle.target_ones, deadline as usize, series.len())
                }
                CorrectionPolicy::SingleShot => {
                    never_moves_away(&series, cycle.target_ones, recovery as usize)
                }
            }
        });
        debug!("Cycle {} tally: {:?}", cycle.id, series);
        info!(
            "RingFault complete: agent {} down {}..{}, final tally {}/{}",
            member,
            FAULT_START,
            recovery,
            series.last().copied().unwrap_or(0),
            cycle.target_ones
        );
        Ok((world, verdict))
    }

    /// EQ-004: outage on an agent no one observes.
    fn run_follower_fault(&self, fixture: &Fixture) -> Result<Outcome, BuildError> {
        let follower = followers(&fixture.topology)
            .first()
            .copied()
            .ok_or_else(|| BuildError::setup("topology has no follower outside the cycles"))?;
        let recovery = FAULT_START + FAULT_DURATION;
        self.require_steps(recovery)?;

        let schedule = FaultSchedule::new()
            .with_window(FaultWindow::new(follower, FAULT_START, FAULT_DURATION));
        let world = self.simulate(fixture, schedule)?;

        let verdict = all_cycles_on_target(&world)
            .and_then(|_| matches_pattern(&world, &fixture.pattern, recovery));
        Ok((world, verdict))
    }

    /// EQ-005: a blip runs one correction and changes nothing.
    fn run_blip(&self, fixture: &Fixture) -> Result<Outcome, BuildError> {
        let cycle = ring(&fixture.topology)?;
        let member = cycle.members[1 % cycle.len()];
        self.require_steps(BLIP_STEP)?;

        let schedule = FaultSchedule::new().with_window(FaultWindow::blip(member, BLIP_STEP));
        let world = self.simulate(fixture, schedule)?;

        let verdict = matches_pattern(&world, &fixture.pattern, 0).and_then(|_| {
            match world.corrections() {
                [event] if !event.flipped => Ok(()),
                events => Err(format!(
                    "expected one unflipped correction, got {:?}",
                    events
                )),
            }
        });
        Ok((world, verdict))
    }

    /// EQ-006: every follower fails in turn.
    fn run_follower_storm(&self, fixture: &Fixture) -> Result<Outcome, BuildError> {
        let followers = followers(&fixture.topology);
        if followers.is_empty() {
            return Err(BuildError::setup("topology has no follower outside the cycles"));
        }

        let schedule = followers
            .iter()
            .enumerate()
            .fold(FaultSchedule::new(), |schedule, (i, &agent)| {
                schedule.with_window(FaultWindow::new(agent, STORM_START + i as u64, STORM_DURATION))
            });
        let calm = schedule.last_transition().unwrap_or(0);
        self.require_steps(calm)?;

        let world = self.simulate(fixture, schedule)?;
        let verdict = all_cycles_on_target(&world)
            .and_then(|_| matches_pattern(&world, &fixture.pattern, calm));
        Ok((world, verdict))
    }

    /// EQ-007: two runs from one seed must be byte-identical.
    fn run_replay(&self, fixture: &Fixture) -> Result<Outcome, BuildError> {
        let cycle = ring(&fixture.topology)?;
        let member = cycle.members[1 % cycle.len()];
        let schedule =
            FaultSchedule::new().with_window(FaultWindow::new(member, FAULT_START, FAULT_DURATION));

        let first = self.simulate(fixture, schedule.clone())?;
        let second = self.simulate(fixture, schedule)?;

        let verdict = if first.trace().render() != second.trace().render() {
            Err("traces diverged between identical runs".to_string())
        } else if first.events() != second.events() {
            Err("event logs diverged between identical runs".to_string())
        } else {
            Ok(())
        };
        Ok((first, verdict))
    }
}

/// The first cycle of the topology.
fn ring(topology: &Topology) -> Result<Cycle, BuildError> {
    topology
        .cycles()
        .first()
        .cloned()
        .ok_or_else(|| BuildError::setup("topology has no cycle"))
}

/// Off-cycle agents that no other agent observes.
fn followers(topology: &Topology) -> Vec<AgentId> {
    let mut observed = vec![false; topology.num_agents()];
    for agent in topology.agents() {
        if !agent.rule.is_constant() {
            for &b in &agent.neighbors {
                observed[b] = true;
            }
        }
    }
    topology
        .agents()
        .iter()
        .filter(|a| a.cycle.is_none() && !observed[a.id])
        .map(|a| a.id)
        .collect()
}

/// Every committed state from step `from` equals the pattern's column.
fn matches_pattern(world: &SimWorld, pattern: &Pattern, from: u64) -> Result<(), String> {
    match world
        .trace()
        .iter()
        .filter(|s| s.step >= from)
        .find(|s| s.state != pattern.column(s.step as usize))
    {
        Some(snapshot) => Err(format!(
            "step {} diverged from the pattern: {}",
            snapshot.step,
            snapshot.render()
        )),
        None => Ok(()),
    }
}

fn no_anomalies(world: &SimWorld) -> Result<(), String> {
    match world.anomalies().first() {
        Some(anomaly) => Err(format!("{} ({} total)", anomaly, world.anomalies().len())),
        None => Ok(()),
    }
}

/// Tally equals `target` on steps `from..to`.
fn on_target(series: &[usize], target: usize, from: usize, to: usize) -> Result<(), String> {
    let to = to.min(series.len());
    match (from..to).find(|&t| series[t] != target) {
        Some(t) => Err(format!(
            "cycle tally {} at step {}, target {}",
            series[t], t, target
        )),
        None => Ok(()),
    }
}

/// The single correction at `recovery` never increases the deviation, and the
/// tally holds afterwards.
fn never_moves_away(series: &[usize], target: usize, recovery: usize) -> Result<(), String> {
    let before = series[recovery - 1].abs_diff(target);
    let after = series[recovery].abs_diff(target);
    if after > before {
        return Err(format!(
            "correction at step {} moved tally away from {} ({} -> {})",
            recovery, target, series[recovery - 1], series[recovery]
        ));
    }
    on_target(series, series[recovery], recovery, series.len())
        .map_err(|_| format!("tally drifted after the correction at step {}", recovery))
}

fn all_cycles_on_target(world: &SimWorld) -> Result<(), String> {
    for cycle in world.topology().cycles() {
        on_target(
            &world.trace().cycle_series(cycle.id),
            cycle.target_ones,
            0,
            usize::MAX,
        )
        .map_err(|e| format!("cycle {}: {}", cycle.id, e))?;
    }
    Ok(())
}

/// No agent in two cycles and every target within its cycle's size.
fn cycles_consistent(topology: &Topology) -> Result<(), String> {
    for cycle in topology.cycles() {
        if cycle.target_ones > cycle.len() {
            return Err(format!(
                "cycle {} targets {} ones with {} members",
                cycle.id,
                cycle.target_ones,
                cycle.len()
            ));
        }
        if let Some(&agent) = cycle
            .members
            .iter()
            .find(|&&a| topology.agents()[a].cycle != Some(cycle.id))
        {
            return Err(format!("agent {} is not assigned to cycle {}", agent, cycle.id));
        }
    }
    Ok(())
}

/// Fault scenarios must schedule at least one window; fault-free ones none.
fn faults_as_declared(scenario: ScenarioId, world: &SimWorld) -> Result<(), String> {
    match (scenario.has_faults(), world.schedule().is_empty()) {
        (true, true) => Err(format!("{} scheduled no fault windows", scenario.name())),
        (false, false) => Err(format!(
            "{} scheduled {} fault window(s) in a fault-free run",
            scenario.name(),
            world.schedule().len()
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios_pass_by_default() {
        for correction in [CorrectionPolicy::SingleShot, CorrectionPolicy::UntilStable] {
            let runner = ScenarioRunner::new(42, 15).with_correction(correction);
            for scenario in ScenarioId::all() {
                let result = runner.run(scenario);
                assert!(
                    result.passed,
                    "{} ({}) failed: {:?}",
                    scenario,
                    correction,
                    result.failure_reason
                );
            }
        }
    }

    #[test]
    fn test_fault_schedules_match_scenarios() {
        let runner = ScenarioRunner::new(42, 15);
        for scenario in ScenarioId::all() {
            let run = runner.execute(scenario).unwrap();
            assert_eq!(
                run.world.schedule().is_empty(),
                !scenario.has_faults(),
                "{}",
                scenario
            );
            assert!(faults_as_declared(scenario, &run.world).is_ok());
        }

        // A fault-free world cannot stand in for a fault scenario
        let steady = runner.execute(ScenarioId::Steady).unwrap();
        let err = faults_as_declared(ScenarioId::RingFault, &steady.world).unwrap_err();
        assert!(err.contains("no fault windows"));
    }

    #[test]
    fn test_ring_fault_across_seeds() {
        for seed in 0..16 {
            let runner = ScenarioRunner::new(seed, 15).with_correction(CorrectionPolicy::UntilStable);
            let result = runner.run(ScenarioId::RingFault);
            assert!(result.passed, "seed {}: {:?}", seed, result.failure_reason);
            assert_eq!(result.metrics.down_steps, 2);
            assert!(result.metrics.max_deviation <= 2);
        }
    }

    #[test]
    fn test_follower_fault_without_followers() {
        // gcd(7, 3) = 1: every agent sits on the ring
        let result = ScenarioRunner::new(42, 7).with_ones(3).run(ScenarioId::FollowerFault);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("no follower"));
    }

    #[test]
    fn test_step_budget_too_small() {
        let result = ScenarioRunner::new(42, 15).with_steps(5).run(ScenarioId::RingFault);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("at least 10 steps"));
    }

    #[test]
    fn test_invalid_generator_parameters() {
        let result = ScenarioRunner::new(42, 5).with_ones(9).run(ScenarioId::Steady);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().starts_with("Setup failed"));
    }

    #[test]
    fn test_observed_pattern_override() {
        // A 3-ring rotating a single one
        let pattern = Pattern::from_strings(&["100", "010", "001"]).unwrap();
        let runner = ScenarioRunner::new(7, 3)
            .with_pattern(pattern)
            .with_correction(CorrectionPolicy::UntilStable)
            .with_steps(20);

        let run = runner.execute(ScenarioId::RingFault).unwrap();
        assert!(run.result.passed, "{:?}", run.result.failure_reason);
        assert_eq!(run.world.topology().cycles().len(), 1);
        assert_eq!(run.world.topology().cycles()[0].target_ones, 1);

        let steady = runner.run(ScenarioId::Steady);
        assert!(steady.passed, "{:?}", steady.failure_reason);
    }

    #[test]
    fn test_execute_exports_run() {
        let run = ScenarioRunner::new(42, 15)
            .with_steps(12)
            .execute(ScenarioId::RingFault)
            .unwrap();
        let export = run.export();

        assert_eq!(export.scenario, "ring_fault");
        assert_eq!(export.frames.len(), 13);
        assert_eq!(export.passed, run.result.passed);
        assert_eq!(export.corrections.len(), run.result.metrics.corrections);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let a = ScenarioRunner::new(1234, 15).run(ScenarioId::Replay);
        let b = ScenarioRunner::new(1234, 15).run(ScenarioId::Replay);
        assert!(a.passed);
        assert_eq!(a.metrics, b.metrics);
    }
}
