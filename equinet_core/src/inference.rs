//! Strategy inference: recover a minimal local rule per agent from a pattern.
//!
//! For each agent the search tries neighbour subsets of increasing size,
//! starting from the empty set ("ignore all input"). Subsets of one size are
//! visited in an order shuffled by the caller's generator, so the same seed
//! always selects the same rule when several subsets would qualify. A subset
//! is accepted when the observed keys determine the agent's next state:
//!
//! ```text
//! key(t) = pattern[c0][t] ++ pattern[c1][t] ++ ...      (cols sorted by id)
//! key(t) == key(t')  =>  pattern[a][t+1] == pattern[a][t'+1]   (mod T)
//! ```
//!
//! The search is exponential in the candidate count and meant for small
//! networks.

use crate::error::{InferenceError, InferenceFailure};
use crate::pattern::Pattern;
use crate::types::{AgentId, Bit, KeyedRule, ObservationKey, Rule};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// The rule selected for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredStrategy {
    pub agent: AgentId,

    /// Observed neighbours in key order (sorted by id). Empty for constants.
    pub neighbors: Vec<AgentId>,

    pub rule: Rule,

    /// How often each key occurred over one period.
    pub key_counts: BTreeMap<ObservationKey, usize>,
}

impl InferredStrategy {
    /// A constant strategy standing in for an agent whose inference failed.
    pub fn fallback(agent: AgentId, bit: Bit) -> Self {
        Self {
            agent,
            neighbors: Vec::new(),
            rule: Rule::Constant(bit),
            key_counts: BTreeMap::new(),
        }
    }
}

/// Per-agent candidate neighbour sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateNeighbors(Vec<Vec<AgentId>>);

impl CandidateNeighbors {
    /// Every agent may observe every agent, itself included.
    pub fn all(num_agents: usize) -> Self {
        Self(vec![(0..num_agents).collect(); num_agents])
    }

    pub fn explicit(lists: Vec<Vec<AgentId>>) -> Self {
        Self(lists)
    }

    pub fn for_agent(&self, agent: AgentId) -> &[AgentId] {
        &self.0[agent]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Search parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Shuffle subsets of each size; otherwise visit them lexicographically.
    pub shuffle: bool,

    /// Largest subset size to try (`None` = all candidates).
    pub max_subset_size: Option<usize>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            shuffle: true,
            max_subset_size: None,
        }
    }
}

impl InferenceConfig {
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_max_subset_size(mut self, max: usize) -> Self {
        self.max_subset_size = Some(max);
        self
    }
}

/// What to do with agents whose inference failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Report the first failure as an error.
    #[default]
    Abort,
    /// Substitute a constant rule emitting this bit.
    Fallback(Bit),
}

/// Outcome of inferring every agent.
#[derive(Debug, Clone)]
pub struct InferenceReport {
    results: Vec<Result<InferredStrategy, InferenceFailure>>,
}

impl InferenceReport {
    pub fn results(&self) -> &[Result<InferredStrategy, InferenceFailure>] {
        &self.results
    }

    pub fn strategies(&self) -> impl Iterator<Item = &InferredStrategy> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &InferenceFailure> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }

    /// Resolves failures according to `policy`.
    pub fn into_strategies(
        self,
        policy: FailurePolicy,
    ) -> Result<Vec<InferredStrategy>, InferenceFailure> {
        self.results
            .into_iter()
            .map(|result| match (result, policy) {
                (Ok(strategy), _) => Ok(strategy),
                (Err(failure), FailurePolicy::Abort) => Err(failure),
                (Err(failure), FailurePolicy::Fallback(bit)) => {
                    warn!(
                        "Agent {}: no consistent rule, substituting constant {}",
                        failure.agent, bit
                    );
                    Ok(InferredStrategy::fallback(failure.agent, bit))
                }
            })
            .collect()
    }
}

/// The inference engine.
#[derive(Debug, Clone, Default)]
pub struct StrategyInference {
    config: InferenceConfig,
}

impl StrategyInference {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Infers a rule for every agent of `pattern`.
    ///
    /// Input errors abort the call; per-agent failures are reported in the
    /// returned [`InferenceReport`].
    pub fn infer<R: Rng + ?Sized>(
        &self,
        pattern: &Pattern,
        candidates: &CandidateNeighbors,
        rng: &mut R,
    ) -> Result<InferenceReport, InferenceError> {
        let n = pattern.num_agents();
        if candidates.len() != n {
            return Err(InferenceError::CandidateCountMismatch {
                expected: n,
                found: candidates.len(),
            });
        }

        let mut results = Vec::with_capacity(n);
        for agent in 0..n {
            let cols = normalize_candidates(agent, candidates.for_agent(agent), n)?;
            results.push(self.infer_agent(pattern, agent, &cols, rng));
        }

        let report = InferenceReport { results };
        info!(
            "Inferred {}/{} strategies over a period of {}",
            report.strategies().count(),
            n,
            pattern.period()
        );
        Ok(report)
    }

    /// Infers the rule for one agent. `candidates` must already be sorted,
    /// deduplicated and no wider than an observation key.
    pub(crate) fn infer_agent<R: Rng + ?Sized>(
        &self,
        pattern: &Pattern,
        agent: AgentId,
        candidates: &[AgentId],
        rng: &mut R,
    ) -> Result<InferredStrategy, InferenceFailure> {
        let max_size = self
            .config
            .max_subset_size
            .map_or(candidates.len(), |m| m.min(candidates.len()));

        for size in 0..=max_size {
            let mut subsets = combinations(candidates, size);
            if self.config.shuffle {
                subsets.shuffle(rng);
            }

            for cols in subsets {
                let Some((table, key_counts)) = consistent_mapping(pattern, agent, &cols) else {
                    continue;
                };

                let strategy = match table.uniform_output() {
                    Some(bit) => InferredStrategy {
                        agent,
                        neighbors: Vec::new(),
                        rule: Rule::Constant(bit),
                        key_counts: BTreeMap::from([(ObservationKey::empty(), pattern.period())]),
                    },
                    None => InferredStrategy {
                        agent,
                        neighbors: cols,
                        rule: Rule::Keyed(table),
                        key_counts,
                    },
                };
                debug!(
                    "Agent {}: accepted {} neighbour(s) {:?}",
                    agent,
                    strategy.neighbors.len(),
                    strategy.neighbors
                );
                return Ok(strategy);
            }
        }

        warn!("Agent {}: no consistent rule found", agent);
        Err(InferenceFailure {
            agent,
            candidates: candidates.len(),
        })
    }
}

/// Validates one candidate list and returns it sorted without duplicates.
fn normalize_candidates(
    agent: AgentId,
    candidates: &[AgentId],
    num_agents: usize,
) -> Result<Vec<AgentId>, InferenceError> {
    if let Some(&neighbor) = candidates.iter().find(|&&c| c >= num_agents) {
        return Err(InferenceError::UnknownCandidate { agent, neighbor });
    }
    let mut cols = candidates.to_vec();
    cols.sort_unstable();
    cols.dedup();
    if cols.len() > ObservationKey::MAX_WIDTH {
        return Err(InferenceError::TooManyCandidates {
            agent,
            count: cols.len(),
            max: ObservationKey::MAX_WIDTH,
        });
    }
    Ok(cols)
}

/// Builds the key -> next-state table for `cols`, or `None` if some key
/// maps to two different targets.
fn consistent_mapping(
    pattern: &Pattern,
    agent: AgentId,
    cols: &[AgentId],
) -> Option<(KeyedRule, BTreeMap<ObservationKey, usize>)> {
    let mut table = BTreeMap::new();
    let mut counts = BTreeMap::new();

    for t in 0..pattern.period() {
        let key = ObservationKey::from_bits(cols.iter().map(|&c| pattern.bit(c, t)));
        let target = pattern.bit(agent, t + 1);

        match table.entry(key) {
            Entry::Occupied(entry) if *entry.get() != target => return None,
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert(target);
            }
        }
        *counts.entry(key).or_insert(0) += 1;
    }

    Some((KeyedRule::from_table(cols.len(), table), counts))
}

/// All `size`-element subsets of `items`, in lexicographic order.
fn combinations(items: &[AgentId], size: usize) -> Vec<Vec<AgentId>> {
    let n = items.len();
    if size > n {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..size).collect();
    loop {
        out.push(idx.iter().map(|&i| items[i]).collect());

        // Advance the rightmost index that still has room
        let Some(pos) = (0..size).rev().find(|&i| idx[i] != i + n - size) else {
            return out;
        };
        idx[pos] += 1;
        for j in pos + 1..size {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equitable::EquitableGraph;
    use crate::generator::SlidingWindow;
    use crate::pattern::PatternSource;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    /// Every step of the pattern is reproduced by the strategy.
    fn reproduces(pattern: &Pattern, strategy: &InferredStrategy) -> bool {
        (0..pattern.period()).all(|t| {
            let key = ObservationKey::from_bits(strategy.neighbors.iter().map(|&c| pattern.bit(c, t)));
            strategy.rule.apply(key) == Some(pattern.bit(strategy.agent, t + 1))
        })
    }

    #[test]
    fn test_combinations() {
        assert_eq!(combinations(&[1, 2, 3], 0), vec![Vec::<usize>::new()]);
        assert_eq!(
            combinations(&[1, 2, 3], 2),
            vec![vec![1, 2], vec![1, 3], vec![2, 3]]
        );
        assert_eq!(combinations(&[4, 5], 2), vec![vec![4, 5]]);
        assert!(combinations(&[1], 2).is_empty());
    }

    #[test]
    fn test_constant_agent_collapses() {
        // Agent 0 is always 1; agent 1 alternates
        let pattern = Pattern::from_strings(&["111", "010"]).unwrap();
        let engine = StrategyInference::default();
        let strategy = engine.infer_agent(&pattern, 0, &[0, 1], &mut rng(1)).unwrap();

        assert!(strategy.neighbors.is_empty());
        assert_eq!(strategy.rule, Rule::Constant(Bit::One));
    }

    #[test]
    fn test_prefers_smallest_subset() {
        // Agent 1 copies agent 0 with a one-step lag
        let pattern = Pattern::from_strings(&["1100", "0110", "1010"]).unwrap();
        let engine = StrategyInference::default();
        let strategy = engine.infer_agent(&pattern, 1, &[0, 1, 2], &mut rng(9)).unwrap();

        assert_eq!(strategy.neighbors, vec![0]);
        assert_eq!(strategy.rule, Rule::Keyed(KeyedRule::copy()));
        assert!(reproduces(&pattern, &strategy));
    }

    #[test]
    fn test_inconsistent_agent_fails() {
        let pattern = Pattern::from_strings(&["0011", "0000"]).unwrap();
        let engine = StrategyInference::default();
        let report = engine
            .infer(&pattern, &CandidateNeighbors::all(2), &mut rng(1))
            .unwrap();

        assert!(!report.is_complete());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].agent, 0);
        // Agent 1 still gets its constant rule
        assert_eq!(report.strategies().count(), 1);
    }

    #[test]
    fn test_failure_policies() {
        let pattern = Pattern::from_strings(&["0011", "0000"]).unwrap();
        let engine = StrategyInference::default();

        let report = engine
            .infer(&pattern, &CandidateNeighbors::all(2), &mut rng(1))
            .unwrap();
        let err = report.clone().into_strategies(FailurePolicy::Abort).unwrap_err();
        assert_eq!(err.agent, 0);

        let strategies = report.into_strategies(FailurePolicy::Fallback(Bit::Zero)).unwrap();
        assert_eq!(strategies[0].rule, Rule::Constant(Bit::Zero));
        assert_eq!(strategies.len(), 2);
    }

    #[test]
    fn test_max_subset_size_limits_search() {
        // Agent 2's next state is the XOR of agents 0 and 1
        let pattern = Pattern::from_strings(&["0011", "0101", "0011"]).unwrap();
        let capped = StrategyInference::new(InferenceConfig::default().with_max_subset_size(1));
        assert!(capped.infer_agent(&pattern, 2, &[0, 1], &mut rng(1)).is_err());

        let full = StrategyInference::default();
        let strategy = full.infer_agent(&pattern, 2, &[0, 1], &mut rng(1)).unwrap();
        assert_eq!(strategy.neighbors, vec![0, 1]);
        assert!(reproduces(&pattern, &strategy));
    }

    #[test]
    fn test_invalid_candidates_rejected() {
        let pattern = Pattern::from_strings(&["01", "10"]).unwrap();
        let engine = StrategyInference::default();

        let err = engine
            .infer(&pattern, &CandidateNeighbors::explicit(vec![vec![0]]), &mut rng(1))
            .unwrap_err();
        assert_eq!(err, InferenceError::CandidateCountMismatch { expected: 2, found: 1 });

        let err = engine
            .infer(
                &pattern,
                &CandidateNeighbors::explicit(vec![vec![0], vec![5]]),
                &mut rng(1),
            )
            .unwrap_err();
        assert_eq!(err, InferenceError::UnknownCandidate { agent: 1, neighbor: 5 });
    }

    #[test]
    fn test_too_many_candidates_rejected() {
        let rows = vec!["01"; 70];
        let pattern = Pattern::from_strings(&rows).unwrap();
        let err = StrategyInference::default()
            .infer(&pattern, &CandidateNeighbors::all(70), &mut rng(1))
            .unwrap_err();
        assert_eq!(
            err,
            InferenceError::TooManyCandidates {
                agent: 0,
                count: 70,
                max: ObservationKey::MAX_WIDTH
            }
        );
    }

    #[test]
    fn test_unsorted_candidates_yield_sorted_neighbors() {
        // Agent 2 needs both 0 and 1; its list arrives reversed with a duplicate
        let pattern = Pattern::from_strings(&["0011", "0101", "0011"]).unwrap();
        let candidates = CandidateNeighbors::explicit(vec![
            vec![0, 1, 2],
            vec![0, 1, 2],
            vec![1, 0, 1],
        ]);
        let report = StrategyInference::default()
            .infer(&pattern, &candidates, &mut rng(3))
            .unwrap();

        let strategy = report.results()[2].as_ref().unwrap();
        assert_eq!(strategy.neighbors, vec![0, 1]);
        assert!(reproduces(&pattern, strategy));
    }

    #[test]
    fn test_equitable_round_trip() {
        let graph = EquitableGraph::new(15, 9).unwrap();
        let pattern = graph.pattern();
        let engine = StrategyInference::default();
        let strategies = engine
            .infer(&pattern, &CandidateNeighbors::explicit(graph.neighbors()), &mut rng(5))
            .unwrap()
            .into_strategies(FailurePolicy::Abort)
            .unwrap();

        assert_eq!(strategies, graph.strategies());
    }

    #[test]
    fn test_key_counts_cover_period() {
        let graph = EquitableGraph::new(15, 9).unwrap();
        let pattern = graph.pattern();
        let strategy = StrategyInference::default()
            .infer_agent(&pattern, 3, &[0], &mut rng(5))
            .unwrap();
        let total: usize = strategy.key_counts.values().sum();
        assert_eq!(total, pattern.period());
        assert_eq!(strategy.key_counts[&"1".parse().unwrap()], 3);
    }

    #[test]
    fn test_same_seed_same_choice() {
        // Twins make several single-neighbour rules equally valid
        let pattern = SlidingWindow::new(15, 9).unwrap().generate(&mut rng(0)).unwrap();
        let engine = StrategyInference::default();
        let candidates = CandidateNeighbors::all(15);

        let a = engine.infer(&pattern, &candidates, &mut rng(77)).unwrap();
        let b = engine.infer(&pattern, &candidates, &mut rng(77)).unwrap();
        assert_eq!(a.results(), b.results());
    }

    #[test]
    fn test_unshuffled_search_is_lexicographic() {
        let pattern = SlidingWindow::new(15, 9).unwrap().generate(&mut rng(0)).unwrap();
        let engine = StrategyInference::new(InferenceConfig::default().with_shuffle(false));
        // Agent 0 at t+1 equals agents 6, 7, 8 at t; the lowest id wins
        let strategy = engine.infer_agent(&pattern, 0, &(0..15).collect::<Vec<_>>(), &mut rng(1)).unwrap();
        assert_eq!(strategy.neighbors, vec![6]);
    }

    proptest! {
        #[test]
        fn prop_sliding_window_round_trip(n in 2usize..9, step_seed in 0usize..100, seed in any::<u64>()) {
            let step = 1 + step_seed % n;
            let pattern = SlidingWindow::new(n, step)
                .unwrap()
                .with_agent_permutations(true)
                .generate(&mut rng(seed))
                .unwrap();
            let report = StrategyInference::default()
                .infer(&pattern, &CandidateNeighbors::all(n), &mut rng(seed ^ 1))
                .unwrap();

            prop_assert!(report.is_complete());
            for strategy in report.strategies() {
                prop_assert!(strategy.neighbors.len() <= 1);
                prop_assert!(reproduces(&pattern, strategy));
            }
        }
    }
}
