use anyhow::{ensure, Result};

use super::numeric::{absolute, safe_ratio, weighted_blend};
use super::{check_init_bounds, AttentionComputer, Attentions, MasteryReport};
use crate::config::LpPotParams;
use crate::history::ReturnHistories;

/// Absolute learning progress plus weighted potential, no graph reasoning.
///
///   A(i) = a_lp(i) + c * Pot(i)
///
/// The representative return is the latest one. The lower bound stays at its
/// initial value; the upper bound rises to the best latest return seen.
#[derive(Debug, Clone)]
pub struct LpPotDistComputer {
    min_returns: Vec<f64>,
    max_returns: Vec<f64>,
    returns: Vec<f64>,
    rates: Vec<f64>,
    pot_coef: f64,
}

impl LpPotDistComputer {
    pub fn new(num_tasks: usize, params: &LpPotParams) -> Result<Self> {
        check_init_bounds(num_tasks, &params.init_min_returns, &params.init_max_returns)?;
        ensure!(
            params.pot_coef >= 0.0,
            "pot_coef must be non-negative, got {}",
            params.pot_coef
        );
        Ok(Self {
            min_returns: params.init_min_returns.clone(),
            max_returns: params.init_max_returns.clone(),
            returns: params.init_min_returns.clone(),
            rates: vec![0.0; num_tasks],
            pot_coef: params.pot_coef,
        })
    }

    pub fn max_returns(&self) -> &[f64] {
        &self.max_returns
    }
}

impl AttentionComputer for LpPotDistComputer {
    fn compute_attentions(&mut self, histories: &ReturnHistories, lps: &[f64]) -> Result<Attentions> {
        for (task, history) in histories.iter().enumerate() {
            if let Some(latest) = history.latest() {
                self.returns[task] = latest;
                self.max_returns[task] = self.max_returns[task].max(latest);
            }
        }

        // Only a ceiling: returns below the initial minimum push the rate
        // negative and the potential above one.
        let rates: Vec<f64> = (0..self.num_tasks())
            .map(|i| {
                let lo = self.min_returns[i];
                let hi = self.max_returns[i];
                safe_ratio(self.returns[i].min(hi) - lo, hi - lo, self.rates[i])
            })
            .collect();
        self.rates.clone_from(&rates);
        let pots: Vec<f64> = rates.iter().map(|r| 1.0 - r).collect();

        let a_lps = absolute(lps);
        let attentions = weighted_blend(&a_lps, &pots, self.pot_coef);

        Ok(Attentions {
            attentions: attentions.clone(),
            mastery: Some(MasteryReport {
                returns: self.returns.clone(),
                min_returns: self.min_returns.iter().copied().map(Some).collect(),
                max_returns: self.max_returns.iter().copied().map(Some).collect(),
                na_lps: None,
                rates,
                pots,
                anc_rates: None,
                succ_rates: None,
                learning_states: attentions.clone(),
                pre_attentions: attentions,
            }),
        })
    }

    fn num_tasks(&self) -> usize {
        self.returns.len()
    }

    fn name(&self) -> &'static str {
        "lp_pot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LpPotParams {
        LpPotParams {
            init_min_returns: vec![0.0, 0.0],
            init_max_returns: vec![1.0, 1.0],
            pot_coef: 1.0,
        }
    }

    #[test]
    fn untouched_tasks_have_full_potential() {
        let mut c = LpPotDistComputer::new(2, &params()).unwrap();
        let out = c
            .compute_attentions(&ReturnHistories::new(2), &[0.2, -0.1])
            .unwrap();
        assert!((out.attentions[0] - 1.2).abs() < 1e-12);
        assert!((out.attentions[1] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn max_follows_latest_return() {
        let mut c = LpPotDistComputer::new(2, &params()).unwrap();
        let mut hs = ReturnHistories::new(2);
        hs.append(0, 1, 3.0).unwrap();
        hs.append(0, 2, 1.5).unwrap();
        hs.append(1, 2, 0.5).unwrap();

        let out = c.compute_attentions(&hs, &[0.0, 0.0]).unwrap();
        // Max only saw the latest value of task 0 (1.5), never the earlier 3.0.
        assert_eq!(c.max_returns(), &[1.5, 1.0]);
        let mastery = out.mastery.unwrap();
        assert_eq!(mastery.rates, vec![1.0, 0.5]);
        assert_eq!(out.attentions, vec![0.0, 0.5]);
    }

    #[test]
    fn return_below_floor_raises_potential() {
        let mut c = LpPotDistComputer::new(2, &params()).unwrap();
        let mut hs = ReturnHistories::new(2);
        hs.append(0, 1, -1.0).unwrap();
        let out = c.compute_attentions(&hs, &[0.0, 0.0]).unwrap();
        assert!((out.attentions[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_negative_coefficient() {
        let mut p = params();
        p.pot_coef = -1.0;
        assert!(LpPotDistComputer::new(2, &p).is_err());
    }
}
