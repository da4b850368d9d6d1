//! Graph-aware gating and attention redistribution.

use crate::graph::TaskGraph;

/// Minimum rate over all ancestors of each task; `1.0` for tasks without any.
pub fn ancestor_rates(graph: &TaskGraph, rates: &[f64]) -> Vec<f64> {
    graph
        .nodes()
        .map(|task| {
            graph
                .ancestors(task)
                .iter()
                .map(|&a| rates[a])
                .reduce(f64::min)
                .unwrap_or(1.0)
        })
        .collect()
}

/// Minimum rate over the direct successors of each task; `0.0` for leaves.
pub fn successor_rates(graph: &TaskGraph, rates: &[f64]) -> Vec<f64> {
    graph
        .nodes()
        .map(|task| {
            graph
                .successors(task)
                .into_iter()
                .map(|s| rates[s])
                .reduce(f64::min)
                .unwrap_or(0.0)
        })
        .collect()
}

/// One reverse-topological pass moving `ratio` of each task's attention to its
/// direct predecessors, split equally.
///
/// Dependents are visited before their prerequisites, so a prerequisite passes
/// on part of what it received in the same pass. Tasks without predecessors
/// keep everything; total attention is unchanged. Exactly one pass, no
/// iteration to a fixed point.
pub fn redistribute(graph: &TaskGraph, attentions: &mut [f64], ratio: f64) {
    for &task in graph.topological_order().iter().rev() {
        let preds = graph.predecessors(task);
        if preds.is_empty() {
            continue;
        }
        let moved = attentions[task] * ratio;
        attentions[task] -= moved;
        let share = moved / preds.len() as f64;
        for p in preds {
            attentions[p] += share;
        }
    }
}

/// Intermediate vectors of the gated, redistributed attention computation.
#[derive(Debug, Clone)]
pub struct GatedAttention {
    pub anc_rates: Vec<f64>,
    pub succ_rates: Vec<f64>,
    pub learning_states: Vec<f64>,
    pub pre_attentions: Vec<f64>,
    pub attentions: Vec<f64>,
}

/// `anc^power * learning_state * (1 - succ)`, then one redistribution pass.
pub fn gate_and_redistribute(
    graph: &TaskGraph,
    rates: &[f64],
    learning_states: Vec<f64>,
    power: f64,
    transfer: f64,
) -> GatedAttention {
    let anc_rates = ancestor_rates(graph, rates);
    let succ_rates = successor_rates(graph, rates);

    let pre_attentions: Vec<f64> = (0..rates.len())
        .map(|i| anc_rates[i].powf(power) * learning_states[i] * (1.0 - succ_rates[i]))
        .collect();

    let mut attentions = pre_attentions.clone();
    redistribute(graph, &mut attentions, transfer);

    GatedAttention {
        anc_rates,
        succ_rates,
        learning_states,
        pre_attentions,
        attentions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_redistribution_is_single_reverse_pass() {
        let g = TaskGraph::chain(3).unwrap();
        let mut att = vec![1.0, 1.0, 1.0];
        redistribute(&g, &mut att, 0.5);
        let expected = [1.75, 0.75, 0.5];
        for (a, e) in att.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{att:?}");
        }
    }

    #[test]
    fn redistribution_conserves_mass() {
        let g = TaskGraph::new(6, &[(0, 2), (1, 2), (2, 3), (2, 4), (3, 5), (4, 5), (0, 5)])
            .unwrap();
        for ratio in [0.0, 0.1, 0.5, 0.9, 1.0] {
            let mut att = vec![0.3, 1.2, 0.0, 2.5, 0.7, 1.1];
            let before: f64 = att.iter().sum();
            redistribute(&g, &mut att, ratio);
            let after: f64 = att.iter().sum();
            assert!((before - after).abs() < 1e-9, "ratio {ratio}: {before} vs {after}");
            assert!(att.iter().all(|&a| a >= 0.0));
        }
    }

    #[test]
    fn redistribution_splits_equally_between_predecessors() {
        let g = TaskGraph::new(3, &[(0, 2), (1, 2)]).unwrap();
        let mut att = vec![0.0, 0.0, 1.0];
        redistribute(&g, &mut att, 0.5);
        assert_eq!(att, vec![0.25, 0.25, 0.5]);
    }

    #[test]
    fn roots_and_leaves_are_not_gated() {
        let g = TaskGraph::chain(3).unwrap();
        let rates = [0.2, 0.5, 0.9];
        let anc = ancestor_rates(&g, &rates);
        let succ = successor_rates(&g, &rates);
        assert_eq!(anc[0], 1.0);
        assert_eq!(succ[2], 0.0);
        // Ancestor gate uses the minimum over *all* ancestors.
        assert_eq!(anc[2], 0.2);
        assert_eq!(succ[0], 0.5);
    }

    #[test]
    fn unmastered_prerequisite_suppresses_dependent() {
        let g = TaskGraph::chain(2).unwrap();
        let gated = gate_and_redistribute(&g, &[0.0, 0.0], vec![1.0, 1.0], 1.0, 0.0);
        assert_eq!(gated.pre_attentions, vec![1.0, 0.0]);
    }

    #[test]
    fn mastered_successor_suppresses_prerequisite() {
        let g = TaskGraph::chain(2).unwrap();
        let gated = gate_and_redistribute(&g, &[1.0, 1.0], vec![1.0, 1.0], 1.0, 0.0);
        assert_eq!(gated.pre_attentions, vec![0.0, 1.0]);
    }
}
