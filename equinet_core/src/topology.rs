//! Graph topology: cycle membership and per-cycle "ones" targets.
//!
//! An edge `b -> a` exists when agent `a` observes `b` through a keyed rule.
//! Constant agents ignore their input and contribute no edges. Every agent
//! on a detected cycle is assigned that cycle; the cycle's target is the
//! number of its members in state `1` at step 0 of the fault-free pattern.

use crate::cycles::CycleDetector;
use crate::error::TopologyError;
use crate::inference::InferredStrategy;
use crate::pattern::Pattern;
use crate::types::{count_ones, render_bits, AgentId, Bit, CycleId, ObservationKey, Rule};
use serde::Serialize;
use tracing::{debug, info};

/// A detected dependency cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    pub id: CycleId,

    /// Members in cyclic order along dependency edges.
    pub members: Vec<AgentId>,

    /// Ones the cycle carries when fault-free and stable.
    pub target_ones: usize,
}

impl Cycle {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of members in state `1` in `state`.
    pub fn tally(&self, state: &[Bit]) -> usize {
        self.members.iter().filter(|&&a| state[a].is_one()).count()
    }
}

/// Structural description of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyAgent {
    pub id: AgentId,
    pub neighbors: Vec<AgentId>,
    pub rule: Rule,
    pub cycle: Option<CycleId>,
}

/// Agents, their rules and cycles, plus the initial global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    agents: Vec<TopologyAgent>,
    cycles: Vec<Cycle>,
    initial_state: Vec<Bit>,
}

/// Dependency edges (`observed -> observer`) of keyed rules.
pub fn dependency_edges(strategies: &[InferredStrategy]) -> Vec<(AgentId, AgentId)> {
    strategies
        .iter()
        .filter(|s| !s.rule.is_constant())
        .flat_map(|s| s.neighbors.iter().map(move |&b| (b, s.agent)))
        .collect()
}

impl Topology {
    /// Builds a topology from strategies indexed `0..N`, detected cycles and
    /// the step-0 global state.
    pub fn build(
        strategies: Vec<InferredStrategy>,
        cycles: Vec<Vec<AgentId>>,
        initial_state: &[Bit],
    ) -> Result<Self, TopologyError> {
        let n = strategies.len();
        if initial_state.len() != n {
            return Err(TopologyError::WidthMismatch {
                expected: n,
                found: initial_state.len(),
            });
        }
        for (position, strategy) in strategies.iter().enumerate() {
            if strategy.agent != position {
                return Err(TopologyError::MisindexedStrategy {
                    position,
                    agent: strategy.agent,
                });
            }
        }

        let mut assignment: Vec<Option<CycleId>> = vec![None; n];
        let mut built = Vec::with_capacity(cycles.len());
        for (id, members) in cycles.into_iter().enumerate() {
            if members.is_empty() {
                return Err(TopologyError::EmptyCycle { cycle: id });
            }
            for &agent in &members {
                if agent >= n {
                    return Err(TopologyError::UnknownAgent { cycle: id, agent });
                }
                match assignment[agent] {
                    Some(first) if first == id => {
                        return Err(TopologyError::DuplicateMember { cycle: id, agent });
                    }
                    Some(first) => {
                        return Err(TopologyError::MultipleCycles {
                            agent,
                            first,
                            second: id,
                        });
                    }
                    None => assignment[agent] = Some(id),
                }
            }
            let target_ones = members.iter().filter(|&&a| initial_state[a].is_one()).count();
            built.push(Cycle {
                id,
                members,
                target_ones,
            });
        }

        let agents = strategies
            .into_iter()
            .zip(assignment)
            .map(|(strategy, cycle)| TopologyAgent {
                id: strategy.agent,
                neighbors: strategy.neighbors,
                rule: strategy.rule,
                cycle,
            })
            .collect();

        Self::from_parts(agents, built, initial_state.to_vec())
    }

    /// Builds a topology straight from a pattern, running `detector` over the
    /// strategies' dependency edges.
    pub fn from_pattern<D: CycleDetector + ?Sized>(
        strategies: Vec<InferredStrategy>,
        pattern: &Pattern,
        detector: &D,
    ) -> Result<Self, TopologyError> {
        let edges = dependency_edges(&strategies);
        let cycles = detector.simple_cycles(strategies.len(), &edges);
        debug!("Detected {} cycle(s) over {} edge(s)", cycles.len(), edges.len());
        Self::build(strategies, cycles, &pattern.initial_state())
    }

    /// Assembles a topology from already-resolved parts and validates it.
    pub fn from_parts(
        agents: Vec<TopologyAgent>,
        cycles: Vec<Cycle>,
        initial_state: Vec<Bit>,
    ) -> Result<Self, TopologyError> {
        let topology = Self {
            agents,
            cycles,
            initial_state,
        };
        topology.validate()?;
        Ok(topology)
    }

    fn validate(&self) -> Result<(), TopologyError> {
        let n = self.agents.len();
        if self.initial_state.len() != n {
            return Err(TopologyError::WidthMismatch {
                expected: n,
                found: self.initial_state.len(),
            });
        }

        let mut assignment: Vec<Option<CycleId>> = vec![None; n];
        for (position, cycle) in self.cycles.iter().enumerate() {
            if cycle.id != position {
                return Err(TopologyError::MisindexedCycle {
                    position,
                    cycle: cycle.id,
                });
            }
            if cycle.is_empty() {
                return Err(TopologyError::EmptyCycle { cycle: cycle.id });
            }
            if cycle.target_ones > cycle.len() {
                return Err(TopologyError::TargetExceedsCycle {
                    cycle: cycle.id,
                    target: cycle.target_ones,
                    members: cycle.len(),
                });
            }
            for &agent in &cycle.members {
                if agent >= n {
                    return Err(TopologyError::UnknownAgent { cycle: cycle.id, agent });
                }
                if let Some(first) = assignment[agent] {
                    return Err(if first == cycle.id {
                        TopologyError::DuplicateMember { cycle: cycle.id, agent }
                    } else {
                        TopologyError::MultipleCycles {
                            agent,
                            first,
                            second: cycle.id,
                        }
                    });
                }
                assignment[agent] = Some(cycle.id);
            }
        }

        for (position, agent) in self.agents.iter().enumerate() {
            if agent.id != position {
                return Err(TopologyError::MisindexedStrategy {
                    position,
                    agent: agent.id,
                });
            }
            if let Some(&neighbor) = agent.neighbors.iter().find(|&&b| b >= n) {
                return Err(TopologyError::UnknownNeighbor {
                    agent: agent.id,
                    neighbor,
                });
            }
            if agent.neighbors.len() > ObservationKey::MAX_WIDTH {
                return Err(TopologyError::TooManyNeighbors {
                    agent: agent.id,
                    count: agent.neighbors.len(),
                    max: ObservationKey::MAX_WIDTH,
                });
            }
            if let Rule::Keyed(table) = &agent.rule {
                if table.width() != agent.neighbors.len() {
                    return Err(TopologyError::RuleWidthMismatch {
                        agent: agent.id,
                        width: table.width(),
                        neighbors: agent.neighbors.len(),
                    });
                }
            }
            if agent.cycle != assignment[position] {
                // Either side may be the stray one
                if let Some(cycle) = agent.cycle.or(assignment[position]) {
                    return Err(TopologyError::StrayAssignment {
                        agent: agent.id,
                        cycle,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn agents(&self) -> &[TopologyAgent] {
        &self.agents
    }

    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn initial_state(&self) -> &[Bit] {
        &self.initial_state
    }

    /// Global ones at step 0.
    pub fn initial_ones(&self) -> usize {
        count_ones(&self.initial_state)
    }

    pub fn cycle_of(&self, agent: AgentId) -> Option<&Cycle> {
        self.agents
            .get(agent)
            .and_then(|a| a.cycle)
            .map(|c| &self.cycles[c])
    }

    /// Logs each cycle's target and member chain.
    pub fn summary(&self) {
        info!(
            "Topology: {} agents, {} cycle(s), initial state {}",
            self.num_agents(),
            self.cycles.len(),
            render_bits(&self.initial_state)
        );
        for cycle in &self.cycles {
            let chain: Vec<String> = cycle.members.iter().map(|a| a.to_string()).collect();
            info!(
                "Cycle {}: {} ones, {}",
                cycle.id,
                cycle.target_ones,
                chain.join(" -> ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycles::SccCycleDetector;
    use crate::equitable::EquitableGraph;
    use crate::generator::SlidingWindow;
    use crate::inference::{CandidateNeighbors, FailurePolicy, StrategyInference};
    use crate::pattern::PatternSource;
    use crate::types::{parse_bits, KeyedRule};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeMap;

    fn keyed(agent: AgentId, neighbors: Vec<AgentId>) -> InferredStrategy {
        InferredStrategy {
            agent,
            neighbors,
            rule: Rule::Keyed(KeyedRule::copy()),
            key_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn test_dependency_edges_skip_constants() {
        let strategies = vec![
            keyed(0, vec![2]),
            InferredStrategy::fallback(1, Bit::One),
            keyed(2, vec![0]),
        ];
        assert_eq!(dependency_edges(&strategies), vec![(2, 0), (0, 2)]);
    }

    #[test]
    fn test_equitable_topology() {
        let graph = EquitableGraph::new(15, 9).unwrap();
        let topology =
            Topology::from_pattern(graph.strategies(), &graph.pattern(), &SccCycleDetector).unwrap();

        assert_eq!(topology.cycles().len(), 1);
        let ring = &topology.cycles()[0];
        assert_eq!(ring.members, vec![0, 3, 6, 9, 12]);
        assert_eq!(ring.target_ones, 3);
        assert_eq!(topology.cycle_of(3).map(|c| c.id), Some(0));
        assert!(topology.cycle_of(2).is_none());
        assert_eq!(topology.initial_ones(), 9);
    }

    #[test]
    fn test_multi_cycle_membership_rejected() {
        let strategies = vec![keyed(0, vec![1]), keyed(1, vec![0]), keyed(2, vec![0])];
        let state = parse_bits("100").unwrap();
        let err = Topology::build(strategies, vec![vec![0, 1], vec![0, 2]], &state).unwrap_err();
        assert_eq!(
            err,
            TopologyError::MultipleCycles {
                agent: 0,
                first: 0,
                second: 1
            }
        );
    }

    #[test]
    fn test_unknown_and_empty_cycles_rejected() {
        let state = parse_bits("10").unwrap();
        let strategies = || vec![keyed(0, vec![1]), keyed(1, vec![0])];

        assert_eq!(
            Topology::build(strategies(), vec![vec![0, 4]], &state).unwrap_err(),
            TopologyError::UnknownAgent { cycle: 0, agent: 4 }
        );
        assert_eq!(
            Topology::build(strategies(), vec![vec![]], &state).unwrap_err(),
            TopologyError::EmptyCycle { cycle: 0 }
        );
        assert_eq!(
            Topology::build(strategies(), vec![vec![1, 1]], &state).unwrap_err(),
            TopologyError::DuplicateMember { cycle: 0, agent: 1 }
        );
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let err = Topology::build(vec![keyed(0, vec![0])], vec![], &parse_bits("10").unwrap())
            .unwrap_err();
        assert_eq!(err, TopologyError::WidthMismatch { expected: 1, found: 2 });
    }

    #[test]
    fn test_from_parts_rejects_inflated_target() {
        let agents = vec![TopologyAgent {
            id: 0,
            neighbors: vec![0],
            rule: Rule::Keyed(KeyedRule::copy()),
            cycle: Some(0),
        }];
        let cycles = vec![Cycle {
            id: 0,
            members: vec![0],
            target_ones: 2,
        }];
        let err = Topology::from_parts(agents, cycles, vec![Bit::One]).unwrap_err();
        assert_eq!(
            err,
            TopologyError::TargetExceedsCycle {
                cycle: 0,
                target: 2,
                members: 1
            }
        );
    }

    #[test]
    fn test_from_parts_rejects_stray_assignment() {
        let agents = vec![TopologyAgent {
            id: 0,
            neighbors: vec![],
            rule: Rule::Constant(Bit::One),
            cycle: Some(0),
        }];
        let err = Topology::from_parts(agents, vec![], vec![Bit::One]).unwrap_err();
        assert_eq!(err, TopologyError::StrayAssignment { agent: 0, cycle: 0 });
    }

    #[test]
    fn test_from_parts_rejects_rule_width_mismatch() {
        // A one-bit copy rule cannot read a two-neighbour observation
        let agents = vec![
            TopologyAgent {
                id: 0,
                neighbors: vec![],
                rule: Rule::Constant(Bit::One),
                cycle: None,
            },
            TopologyAgent {
                id: 1,
                neighbors: vec![0, 1],
                rule: Rule::Keyed(KeyedRule::copy()),
                cycle: None,
            },
        ];
        let err = Topology::from_parts(agents, vec![], parse_bits("10").unwrap()).unwrap_err();
        assert_eq!(
            err,
            TopologyError::RuleWidthMismatch {
                agent: 1,
                width: 1,
                neighbors: 2
            }
        );
    }

    #[test]
    fn test_from_parts_rejects_too_many_neighbors() {
        let n = 70;
        let mut agents: Vec<TopologyAgent> = (0..n)
            .map(|id| TopologyAgent {
                id,
                neighbors: vec![],
                rule: Rule::Constant(Bit::Zero),
                cycle: None,
            })
            .collect();
        agents[0].neighbors = (0..n).collect();

        let err = Topology::from_parts(agents, vec![], vec![Bit::Zero; n]).unwrap_err();
        assert_eq!(
            err,
            TopologyError::TooManyNeighbors {
                agent: 0,
                count: 70,
                max: ObservationKey::MAX_WIDTH
            }
        );
    }

    proptest! {
        #[test]
        fn prop_inferred_cycles_are_consistent(n in 2usize..10, step_seed in 0usize..100, seed in any::<u64>()) {
            let step = 1 + step_seed % n;
            let pattern = SlidingWindow::new(n, step)
                .unwrap()
                .with_agent_permutations(true)
                .generate(&mut ChaCha8Rng::seed_from_u64(seed))
                .unwrap();
            let strategies = StrategyInference::default()
                .infer(&pattern, &CandidateNeighbors::all(n), &mut ChaCha8Rng::seed_from_u64(seed))
                .unwrap()
                .into_strategies(FailurePolicy::Abort)
                .unwrap();

            // Single-neighbour rules form a functional graph: cycles never share agents
            let topology = Topology::from_pattern(strategies, &pattern, &SccCycleDetector).unwrap();

            let mut seen = vec![0usize; n];
            for cycle in topology.cycles() {
                prop_assert!(cycle.target_ones <= cycle.len());
                for &a in &cycle.members {
                    seen[a] += 1;
                    prop_assert_eq!(topology.agents()[a].cycle, Some(cycle.id));
                }
            }
            prop_assert!(seen.iter().all(|&count| count <= 1));
        }
    }
}
