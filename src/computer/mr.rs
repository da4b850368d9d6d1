use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use super::gating::gate_and_redistribute;
use super::numeric::{absolute, convex_blend, mastering_rate, normalize_by_max, windowed_mean};
use super::{check_init_bounds, check_unit, check_windows, AttentionComputer, Attentions, MasteryReport};
use crate::config::MrParams;
use crate::graph::TaskGraph;
use crate::history::ReturnHistories;

/// Mastering-rate attention over the prerequisite graph.
///
/// Each task first gets a pre-attention
///
///   pre_A(i) = Mast(Anc_i)^p * ((1 - g) * na_lp(i) + g * Pot(i)) * (1 - Mast(Succ_i))
///
/// where `Mast(Anc_i)` is the minimum mastering rate over the ancestors of `i`,
/// `na_lp` the absolute learning progress divided by its maximum, `Pot(i)` one
/// minus the mastering rate of `i`, and `Mast(Succ_i)` the minimum mastering
/// rate over its direct successors. A single reverse-topological pass then
/// hands `pred_tr` of every task's attention to its direct predecessors.
///
/// Bounds start at the configured values and widen with the mean of the last
/// `ext_ret_k` returns once that many are available.
#[derive(Debug, Clone)]
pub struct MrDistComputer {
    graph: Arc<TaskGraph>,
    min_returns: Vec<f64>,
    max_returns: Vec<f64>,
    returns: Vec<f64>,
    rates: Vec<f64>,
    ret_k: usize,
    ext_ret_k: usize,
    power: f64,
    pot_prop: f64,
    pred_tr: f64,
}

impl MrDistComputer {
    pub fn new(graph: Arc<TaskGraph>, params: &MrParams) -> Result<Self> {
        let n = graph.len();
        check_init_bounds(n, &params.init_min_returns, &params.init_max_returns)?;
        check_windows(params.ret_k, params.ext_ret_k)?;
        check_unit("pot_prop", params.pot_prop)?;
        check_unit("pred_tr", params.pred_tr)?;
        anyhow::ensure!(params.power >= 0.0, "power must be non-negative, got {}", params.power);

        Ok(Self {
            graph,
            min_returns: params.init_min_returns.clone(),
            max_returns: params.init_max_returns.clone(),
            returns: params.init_min_returns.clone(),
            rates: vec![0.0; n],
            ret_k: params.ret_k,
            ext_ret_k: params.ext_ret_k,
            power: params.power,
            pot_prop: params.pot_prop,
            pred_tr: params.pred_tr,
        })
    }

    pub fn min_returns(&self) -> &[f64] {
        &self.min_returns
    }

    pub fn max_returns(&self) -> &[f64] {
        &self.max_returns
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    fn update_returns(&mut self, histories: &ReturnHistories) {
        for (task, history) in histories.iter().enumerate() {
            let Some(ret) = windowed_mean(history, self.ret_k) else {
                continue;
            };
            self.returns[task] = ret;

            if history.len() >= self.ext_ret_k {
                if let Some(m) = windowed_mean(history, self.ext_ret_k) {
                    self.min_returns[task] = self.min_returns[task].min(m);
                    self.max_returns[task] = self.max_returns[task].max(m);
                }
            }
        }
    }
}

impl AttentionComputer for MrDistComputer {
    fn compute_attentions(&mut self, histories: &ReturnHistories, lps: &[f64]) -> Result<Attentions> {
        self.update_returns(histories);

        let a_lps = absolute(lps);
        let na_lps = normalize_by_max(&a_lps);

        let rates: Vec<f64> = (0..self.num_tasks())
            .map(|i| {
                mastering_rate(
                    self.returns[i],
                    Some(self.min_returns[i]),
                    Some(self.max_returns[i]),
                    self.rates[i],
                )
            })
            .collect();
        self.rates.clone_from(&rates);
        let pots: Vec<f64> = rates.iter().map(|r| 1.0 - r).collect();

        let learning_states = convex_blend(&na_lps, &pots, self.pot_prop);
        let gated = gate_and_redistribute(&self.graph, &rates, learning_states, self.power, self.pred_tr);

        debug!(rates = ?rates, attentions = ?gated.attentions, "mastering-rate attentions");

        Ok(Attentions {
            attentions: gated.attentions,
            mastery: Some(MasteryReport {
                returns: self.returns.clone(),
                min_returns: self.min_returns.iter().copied().map(Some).collect(),
                max_returns: self.max_returns.iter().copied().map(Some).collect(),
                na_lps: Some(na_lps),
                rates,
                pots,
                anc_rates: Some(gated.anc_rates),
                succ_rates: Some(gated.succ_rates),
                learning_states: gated.learning_states,
                pre_attentions: gated.pre_attentions,
            }),
        })
    }

    fn num_tasks(&self) -> usize {
        self.graph.len()
    }

    fn name(&self) -> &'static str {
        "mr"
    }
}
