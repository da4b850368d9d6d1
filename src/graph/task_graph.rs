//! Petgraph-backed task DAG with precomputed traversal tables.

use std::ops::Range;

use anyhow::{bail, ensure, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

/// Immutable prerequisite DAG.
///
/// Acyclicity is checked once, in [`TaskGraph::new`]. The topological order and
/// the ancestor sets are computed at the same time so that per-round attention
/// computations never re-traverse the graph.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    graph: DiGraph<usize, ()>,
    topo_order: Vec<usize>,
    ancestors: Vec<Vec<usize>>,
}

/// A flattened view of the graph, used for logging and the `graph` subcommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub num_tasks: usize,
    pub edges: Vec<(usize, usize)>,
    pub topological_order: Vec<usize>,
    pub roots: Vec<usize>,
    pub leaves: Vec<usize>,
}

impl TaskGraph {
    /// Build a graph over `num_tasks` tasks from `(prerequisite, dependent)` edges.
    ///
    /// Duplicate edges are collapsed. Out-of-range endpoints, self loops and
    /// cycles are configuration errors.
    pub fn new(num_tasks: usize, edges: &[(usize, usize)]) -> Result<Self> {
        ensure!(num_tasks > 0, "a task graph needs at least one task");

        let mut graph = DiGraph::with_capacity(num_tasks, edges.len());
        for task in 0..num_tasks {
            graph.add_node(task);
        }

        for &(from, to) in edges {
            ensure!(
                from < num_tasks && to < num_tasks,
                "edge ({from}, {to}) references a task outside 0..{num_tasks}"
            );
            ensure!(from != to, "self loop on task {from}");
            graph.update_edge(NodeIndex::new(from), NodeIndex::new(to), ());
        }

        let topo_order = match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|idx| idx.index()).collect(),
            Err(cycle) => bail!(
                "task graph is not acyclic (cycle through task {})",
                cycle.node_id().index()
            ),
        };

        let ancestors = (0..num_tasks)
            .map(|task| {
                let reversed = Reversed(&graph);
                let mut dfs = Dfs::new(reversed, NodeIndex::new(task));
                let mut found = Vec::new();
                while let Some(idx) = dfs.next(reversed) {
                    if idx.index() != task {
                        found.push(idx.index());
                    }
                }
                found.sort_unstable();
                found
            })
            .collect();

        Ok(Self {
            graph,
            topo_order,
            ancestors,
        })
    }

    /// A linear curriculum `0 -> 1 -> ... -> n-1`.
    pub fn chain(num_tasks: usize) -> Result<Self> {
        let edges: Vec<_> = (1..num_tasks).map(|t| (t - 1, t)).collect();
        Self::new(num_tasks, &edges)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Always `false`: construction rejects empty graphs.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn nodes(&self) -> Range<usize> {
        0..self.len()
    }

    /// All edges as `(prerequisite, dependent)` pairs.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (a.index(), b.index()))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Every task from which `task` is reachable, sorted ascending.
    pub fn ancestors(&self, task: usize) -> &[usize] {
        &self.ancestors[task]
    }

    /// Direct prerequisites of `task`, sorted ascending.
    pub fn predecessors(&self, task: usize) -> Vec<usize> {
        self.neighbors(task, Direction::Incoming)
    }

    /// Tasks that list `task` as a direct prerequisite, sorted ascending.
    pub fn successors(&self, task: usize) -> Vec<usize> {
        self.neighbors(task, Direction::Outgoing)
    }

    /// Prerequisites before dependents.
    pub fn topological_order(&self) -> &[usize] {
        &self.topo_order
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            num_tasks: self.len(),
            edges: self.edges(),
            topological_order: self.topo_order.clone(),
            roots: self
                .nodes()
                .filter(|&t| self.predecessors(t).is_empty())
                .collect(),
            leaves: self
                .nodes()
                .filter(|&t| self.successors(t).is_empty())
                .collect(),
        }
    }

    fn neighbors(&self, task: usize, direction: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(task), direction)
            .map(|idx| idx.index())
            .collect();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> TaskGraph {
        //   0
        //  / \
        // 1   2
        //  \ /
        //   3
        TaskGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]).unwrap()
    }

    #[test]
    fn chain_has_expected_structure() {
        let g = TaskGraph::chain(3).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.edges(), vec![(0, 1), (1, 2)]);
        assert_eq!(g.topological_order(), &[0, 1, 2]);
        assert_eq!(g.ancestors(2), &[0, 1]);
        assert!(g.ancestors(0).is_empty());
        assert_eq!(g.predecessors(2), vec![1]);
        assert_eq!(g.successors(0), vec![1]);
        assert!(g.successors(2).is_empty());
    }

    #[test]
    fn diamond_ancestors_and_neighbors() {
        let g = diamond();
        assert_eq!(g.ancestors(3), &[0, 1, 2]);
        assert_eq!(g.ancestors(1), &[0]);
        assert_eq!(g.predecessors(3), vec![1, 2]);
        assert_eq!(g.successors(0), vec![1, 2]);
    }

    #[test]
    fn topological_order_respects_every_edge() {
        let g = diamond();
        let order = g.topological_order();
        let pos = |t: usize| order.iter().position(|&x| x == t).unwrap();
        for (a, b) in g.edges() {
            assert!(pos(a) < pos(b), "edge {a}->{b} violated by {order:?}");
        }
    }

    #[test]
    fn duplicate_edges_are_collapsed() {
        let g = TaskGraph::new(2, &[(0, 1), (0, 1)]).unwrap();
        assert_eq!(g.edges(), vec![(0, 1)]);
        assert_eq!(g.predecessors(1), vec![0]);
    }

    #[test]
    fn rejects_cycles() {
        let err = TaskGraph::new(3, &[(0, 1), (1, 2), (2, 0)]).unwrap_err();
        assert!(err.to_string().contains("not acyclic"));
    }

    #[test]
    fn rejects_self_loops_and_bad_endpoints() {
        assert!(TaskGraph::new(2, &[(1, 1)]).is_err());
        assert!(TaskGraph::new(2, &[(0, 2)]).is_err());
        assert!(TaskGraph::new(0, &[]).is_err());
    }

    #[test]
    fn summary_lists_roots_and_leaves() {
        let s = diamond().summary();
        assert_eq!(s.roots, vec![0]);
        assert_eq!(s.leaves, vec![3]);
        assert_eq!(s.num_tasks, 4);
    }
}
