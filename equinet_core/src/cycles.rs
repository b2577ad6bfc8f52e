//! Simple-cycle detection over the dependency graph.
//!
//! The topology only needs a list of simple cycles; any correct enumeration
//! satisfies the [`CycleDetector`] contract. The default detector first splits
//! the graph into strongly connected components with petgraph, then
//! enumerates each component's cycles with a DFS rooted at the smallest
//! member, so every cycle is reported exactly once.

use crate::types::AgentId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;

/// Enumerates simple cycles.
pub trait CycleDetector {
    /// Returns every simple cycle over `edges` (`from -> to`) on agents
    /// `0..num_agents`, each as member ids in cyclic order along the edges.
    fn simple_cycles(&self, num_agents: usize, edges: &[(AgentId, AgentId)]) -> Vec<Vec<AgentId>>;
}

/// SCC-pruned rooted DFS enumeration.
///
/// Cycles are ordered by their smallest member, then by discovery order;
/// each cycle starts at its smallest member.
#[derive(Debug, Clone, Copy, Default)]
pub struct SccCycleDetector;

impl CycleDetector for SccCycleDetector {
    fn simple_cycles(&self, num_agents: usize, edges: &[(AgentId, AgentId)]) -> Vec<Vec<AgentId>> {
        let mut graph = DiGraph::<AgentId, ()>::with_capacity(num_agents, edges.len());
        let nodes: Vec<_> = (0..num_agents).map(|a| graph.add_node(a)).collect();

        let mut adjacency = vec![Vec::new(); num_agents];
        for &(from, to) in edges {
            if from < num_agents && to < num_agents {
                graph.update_edge(nodes[from], nodes[to], ());
                adjacency[from].push(to);
            }
        }
        for targets in adjacency.iter_mut() {
            targets.sort_unstable();
            targets.dedup();
        }

        let mut components: Vec<Vec<AgentId>> = tarjan_scc(&graph)
            .into_iter()
            .map(|component| {
                let mut members: Vec<AgentId> = component.into_iter().map(|ix| graph[ix]).collect();
                members.sort_unstable();
                members
            })
            .collect();
        components.sort();

        let mut cycles = Vec::new();
        let mut in_component = vec![false; num_agents];
        for component in &components {
            if let [single] = component.as_slice() {
                if adjacency[*single].binary_search(single).is_ok() {
                    cycles.push(vec![*single]);
                }
                continue;
            }

            for &a in component {
                in_component[a] = true;
            }
            for &root in component {
                rooted_cycles(root, &adjacency, &in_component, &mut cycles);
            }
            for &a in component {
                in_component[a] = false;
            }
        }

        cycles.sort_by_key(|cycle| cycle[0]);
        cycles
    }
}

/// Pushes every simple cycle whose smallest member is `root`.
fn rooted_cycles(
    root: AgentId,
    adjacency: &[Vec<AgentId>],
    in_component: &[bool],
    out: &mut Vec<Vec<AgentId>>,
) {
    let mut on_path = vec![false; adjacency.len()];
    let mut path = vec![root];
    let mut cursors = vec![0usize];
    on_path[root] = true;

    while let Some(cursor) = cursors.last_mut() {
        let node = path[path.len() - 1];
        let targets = &adjacency[node];

        if *cursor < targets.len() {
            let next = targets[*cursor];
            *cursor += 1;

            if next == root {
                out.push(path.clone());
            } else if next > root && in_component[next] && !on_path[next] {
                on_path[next] = true;
                path.push(next);
                cursors.push(0);
            }
        } else {
            cursors.pop();
            if let Some(done) = path.pop() {
                on_path[done] = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
        SccCycleDetector.simple_cycles(n, edges)
    }

    #[test]
    fn test_single_ring() {
        let cycles = detect(5, &[(0, 3), (3, 1), (1, 4), (4, 2), (2, 0)]);
        assert_eq!(cycles, vec![vec![0, 3, 1, 4, 2]]);
    }

    #[test]
    fn test_acyclic_graph() {
        assert!(detect(4, &[(0, 1), (1, 2), (0, 3)]).is_empty());
    }

    #[test]
    fn test_self_loop() {
        assert_eq!(detect(3, &[(1, 1), (0, 2)]), vec![vec![1]]);
    }

    #[test]
    fn test_disjoint_rings_with_tails() {
        // Rings {0,1} and {2,3,4}; 5 hangs off the first ring
        let edges = [(0, 1), (1, 0), (2, 3), (3, 4), (4, 2), (1, 5)];
        assert_eq!(detect(6, &edges), vec![vec![0, 1], vec![2, 3, 4]]);
    }

    #[test]
    fn test_overlapping_cycles_reported_separately() {
        // Two cycles share node 0: 0->1->0 and 0->2->0
        let edges = [(0, 1), (1, 0), (0, 2), (2, 0)];
        assert_eq!(detect(3, &edges), vec![vec![0, 1], vec![0, 2]]);
    }

    #[test]
    fn test_complete_digraph_cycle_count() {
        // K3 with all directed edges: three 2-cycles and two 3-cycles
        let mut edges = Vec::new();
        for a in 0..3 {
            for b in 0..3 {
                if a != b {
                    edges.push((a, b));
                }
            }
        }
        let cycles = detect(3, &edges);
        assert_eq!(cycles.len(), 5);
        assert!(cycles.contains(&vec![0, 1, 2]));
        assert!(cycles.contains(&vec![0, 2, 1]));
        assert!(cycles.contains(&vec![1, 2]));
    }

    #[test]
    fn test_out_of_range_edges_ignored() {
        assert!(detect(2, &[(0, 7), (7, 0)]).is_empty());
    }
}
