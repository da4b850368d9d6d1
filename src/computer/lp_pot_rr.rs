use std::sync::Arc;

use anyhow::{ensure, Result};
use tracing::debug;

use super::bounds::TwoStageBounds;
use super::gating::ancestor_rates;
use super::numeric::{absolute, mastering_rate, weighted_blend, windowed_mean};
use super::{check_windows, AttentionComputer, Attentions, MasteryReport};
use crate::config::LpPotRrParams;
use crate::graph::TaskGraph;
use crate::history::ReturnHistories;

/// LP plus potential, restricted to tasks whose prerequisites are mastered.
///
///   A(i) = Rr(Anc_i) * (a_lp(i) + c * Pot(i))
///
/// `Rr(Anc_i)` is the minimum return ratio over the ancestors of `i` (1 for
/// roots), used as a plain multiplicative filter. Return ratios are computed
/// against the committed two-stage bounds; no successor gate, no
/// redistribution.
#[derive(Debug, Clone)]
pub struct LpPotRrDistComputer {
    graph: Arc<TaskGraph>,
    bounds: TwoStageBounds,
    returns: Vec<f64>,
    rrs: Vec<f64>,
    ret_k: usize,
    pot_coef: f64,
}

impl LpPotRrDistComputer {
    pub fn new(graph: Arc<TaskGraph>, params: &LpPotRrParams) -> Result<Self> {
        let n = graph.len();
        check_windows(params.ret_k, params.ext_ret_k)?;
        ensure!(
            params.pot_coef >= 0.0,
            "pot_coef must be non-negative, got {}",
            params.pot_coef
        );
        let bounds = TwoStageBounds::new(
            n,
            params.ext_ret_k,
            params.init_min_returns.as_deref(),
            params.init_max_returns.as_deref(),
        )?;
        let returns = params
            .init_min_returns
            .clone()
            .unwrap_or_else(|| vec![0.0; n]);

        Ok(Self {
            graph,
            bounds,
            returns,
            rrs: vec![0.0; n],
            ret_k: params.ret_k,
            pot_coef: params.pot_coef,
        })
    }

    pub fn bounds(&self) -> &TwoStageBounds {
        &self.bounds
    }

    pub fn return_ratios(&self) -> &[f64] {
        &self.rrs
    }
}

impl AttentionComputer for LpPotRrDistComputer {
    fn compute_attentions(&mut self, histories: &ReturnHistories, lps: &[f64]) -> Result<Attentions> {
        for (task, history) in histories.iter().enumerate() {
            if let Some(ret) = windowed_mean(history, self.ret_k) {
                self.returns[task] = ret;
                self.bounds.observe(task, history);
            }
        }

        let rrs: Vec<f64> = (0..self.num_tasks())
            .map(|i| {
                let (lo, hi) = self.bounds.committed(i);
                mastering_rate(self.returns[i], lo, hi, self.rrs[i])
            })
            .collect();
        self.rrs.clone_from(&rrs);
        let pots: Vec<f64> = rrs.iter().map(|r| 1.0 - r).collect();

        let a_lps = absolute(lps);
        let learning_states = weighted_blend(&a_lps, &pots, self.pot_coef);
        let anc_rrs = ancestor_rates(&self.graph, &rrs);
        let attentions: Vec<f64> = anc_rrs
            .iter()
            .zip(&learning_states)
            .map(|(anc, ls)| anc * ls)
            .collect();

        debug!(rrs = ?rrs, attentions = ?attentions, "return-ratio filtered attentions");

        Ok(Attentions {
            attentions: attentions.clone(),
            mastery: Some(MasteryReport {
                returns: self.returns.clone(),
                min_returns: self.bounds.committed_min().to_vec(),
                max_returns: self.bounds.committed_max().to_vec(),
                na_lps: None,
                rates: rrs,
                pots,
                anc_rates: Some(anc_rrs),
                succ_rates: None,
                learning_states,
                pre_attentions: attentions,
            }),
        })
    }

    fn num_tasks(&self) -> usize {
        self.graph.len()
    }

    fn name(&self) -> &'static str {
        "lp_pot_rr"
    }
}
