use anyhow::Result;

use super::numeric::absolute;
use super::{AttentionComputer, Attentions};
use crate::history::ReturnHistories;

/// Attention is the absolute learning progress, with no graph reasoning.
///
///   A(i) = |lp(i)|
///
/// Baseline for the graph-aware variants.
#[derive(Debug, Clone)]
pub struct LpDistComputer {
    num_tasks: usize,
}

impl LpDistComputer {
    pub fn new(num_tasks: usize) -> Self {
        Self { num_tasks }
    }
}

impl AttentionComputer for LpDistComputer {
    fn compute_attentions(&mut self, _histories: &ReturnHistories, lps: &[f64]) -> Result<Attentions> {
        Ok(Attentions {
            attentions: absolute(lps),
            mastery: None,
        })
    }

    fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    fn name(&self) -> &'static str {
        "lp"
    }
}
