use std::sync::Arc;

use anyhow::{ensure, Result};
use tracing::debug;

use super::bounds::TwoStageBounds;
use super::gating::gate_and_redistribute;
use super::numeric::{absolute, convex_blend, mastering_rate, normalize_by_max, windowed_mean};
use super::{check_unit, check_windows, AttentionComputer, Attentions, MasteryReport};
use crate::config::NlpPotMancRdParams;
use crate::graph::TaskGraph;
use crate::history::ReturnHistories;

/// Normalized LP and potential, gated by ancestor and successor mastery, with
/// redistribution towards predecessors.
///
/// Same attention formula as [`super::MrDistComputer`], but mastering rates
/// are measured against committed two-stage bounds, so a task's range only
/// moves once it has a full `ext_ret_k` window of returns.
#[derive(Debug, Clone)]
pub struct NlpPotMancRdDistComputer {
    graph: Arc<TaskGraph>,
    bounds: TwoStageBounds,
    returns: Vec<f64>,
    rates: Vec<f64>,
    ret_k: usize,
    power: f64,
    pot_prop: f64,
    tr: f64,
}

impl NlpPotMancRdDistComputer {
    pub fn new(graph: Arc<TaskGraph>, params: &NlpPotMancRdParams) -> Result<Self> {
        let n = graph.len();
        check_windows(params.ret_k, params.ext_ret_k)?;
        check_unit("pot_prop", params.pot_prop)?;
        check_unit("tr", params.tr)?;
        ensure!(params.power >= 0.0, "power must be non-negative, got {}", params.power);

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
            rates: vec![0.0; n],
            ret_k: params.ret_k,
            power: params.power,
            pot_prop: params.pot_prop,
            tr: params.tr,
        })
    }

    pub fn bounds(&self) -> &TwoStageBounds {
        &self.bounds
    }
}

impl AttentionComputer for NlpPotMancRdDistComputer {
    fn compute_attentions(&mut self, histories: &ReturnHistories, lps: &[f64]) -> Result<Attentions> {
        for (task, history) in histories.iter().enumerate() {
            if let Some(ret) = windowed_mean(history, self.ret_k) {
                self.returns[task] = ret;
                self.bounds.observe(task, history);
            }
        }

        let a_lps = absolute(lps);
        let na_lps = normalize_by_max(&a_lps);

        let rates: Vec<f64> = (0..self.num_tasks())
            .map(|i| {
                let (lo, hi) = self.bounds.committed(i);
                mastering_rate(self.returns[i], lo, hi, self.rates[i])
            })
            .collect();
        self.rates.clone_from(&rates);
        let pots: Vec<f64> = rates.iter().map(|r| 1.0 - r).collect();

        let learning_states = convex_blend(&na_lps, &pots, self.pot_prop);
        let gated = gate_and_redistribute(&self.graph, &rates, learning_states, self.power, self.tr);

        debug!(rates = ?rates, attentions = ?gated.attentions, "gated and redistributed attentions");

        Ok(Attentions {
            attentions: gated.attentions,
            mastery: Some(MasteryReport {
                returns: self.returns.clone(),
                min_returns: self.bounds.committed_min().to_vec(),
                max_returns: self.bounds.committed_max().to_vec(),
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
        "nlp_pot_manc_rd"
    }
}
