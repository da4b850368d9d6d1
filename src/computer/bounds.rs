//! Two-stage adaptive return bounds.
//!
//! The candidate envelope follows the mean of the trailing `ext_k` returns on
//! every call. The committed snapshot, which is what normalization reads, only
//! advances once a task has at least `ext_k` returns, so a handful of noisy
//! early episodes cannot collapse or blow up the range.
//!
//! Invariant per task: `min <= saved_min <= saved_max <= max`.

use anyhow::{ensure, Result};
use serde::Serialize;

use super::numeric::windowed_mean;
use crate::history::ReturnHistory;

#[derive(Debug, Clone, Serialize)]
pub struct TwoStageBounds {
    ext_k: usize,
    min: Vec<Option<f64>>,
    max: Vec<Option<f64>>,
    saved_min: Vec<Option<f64>>,
    saved_max: Vec<Option<f64>>,
}

impl TwoStageBounds {
    /// Bounds for `num_tasks` tasks.
    ///
    /// Initial values, when given, seed both the candidate and the committed
    /// bounds. Without them every task starts unbounded and the first observed
    /// mean opens the envelope.
    pub fn new(
        num_tasks: usize,
        ext_k: usize,
        init_min: Option<&[f64]>,
        init_max: Option<&[f64]>,
    ) -> Result<Self> {
        ensure!(ext_k > 0, "bound window must be at least 1");
        let (min, max) = match (init_min, init_max) {
            (Some(lo), Some(hi)) => {
                super::check_init_bounds(num_tasks, lo, hi)?;
                (
                    lo.iter().copied().map(Some).collect(),
                    hi.iter().copied().map(Some).collect(),
                )
            }
            (None, None) => (vec![None; num_tasks], vec![None; num_tasks]),
            _ => anyhow::bail!("initial min and max returns must be given together"),
        };

        Ok(Self {
            ext_k,
            saved_min: min.clone(),
            saved_max: max.clone(),
            min,
            max,
        })
    }

    /// Widen the candidate envelope of `task` and commit it if the history is
    /// long enough. Tasks without history are left untouched.
    pub fn observe(&mut self, task: usize, history: &ReturnHistory) {
        let Some(m) = windowed_mean(history, self.ext_k) else {
            return;
        };

        self.min[task] = Some(self.min[task].map_or(m, |lo| lo.min(m)));
        self.max[task] = Some(self.max[task].map_or(m, |hi| hi.max(m)));

        if history.len() >= self.ext_k {
            self.saved_min[task] = self.min[task];
            self.saved_max[task] = self.max[task];
        }
    }

    /// The bounds normalization uses.
    pub fn committed(&self, task: usize) -> (Option<f64>, Option<f64>) {
        (self.saved_min[task], self.saved_max[task])
    }

    /// The running envelope, including not-yet-committed widening.
    pub fn candidate(&self, task: usize) -> (Option<f64>, Option<f64>) {
        (self.min[task], self.max[task])
    }

    pub fn committed_min(&self) -> &[Option<f64>] {
        &self.saved_min
    }

    pub fn committed_max(&self) -> &[Option<f64>] {
        &self.saved_max
    }
}
