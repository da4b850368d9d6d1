//! Attention-to-distribution converters.
//!
//! Attention computers emit an unnormalized, non-negative priority per task.
//! A [`DistConverter`] turns that vector into the probability distribution the
//! multi-environment wrapper samples tasks from.

pub mod converters;

use anyhow::{ensure, Result};

use crate::config::DistConfig;

pub use converters::{BoltzmannDist, GreedyAmaxDist, GreedyPropDist};

/// Maps an attention vector onto a probability distribution over tasks.
pub trait DistConverter: Send + Sync {
    /// Convert `attentions` (non-negative, one per task) into a distribution.
    fn convert(&mut self, attentions: &[f64]) -> Result<Vec<f64>>;

    /// Short label used in logs and reports.
    fn name(&self) -> &'static str;

    fn boxed_clone(&self) -> Box<dyn DistConverter>;
}

/// Attentions must be finite and non-negative; anything else is a bug upstream.
pub(crate) fn check_attentions(attentions: &[f64]) -> Result<()> {
    ensure!(!attentions.is_empty(), "cannot convert an empty attention vector");
    for (task, &a) in attentions.iter().enumerate() {
        ensure!(
            a.is_finite() && a >= 0.0,
            "attention for task {task} must be finite and non-negative, got {a}"
        );
    }
    Ok(())
}

/// Allowed deviation of a distribution's total from 1.
pub const DIST_TOLERANCE: f64 = 1e-6;

/// Checks that `dist` is a distribution over `num_tasks` tasks.
pub fn validate_distribution(dist: &[f64], num_tasks: usize) -> Result<()> {
    ensure!(
        dist.len() == num_tasks,
        "distribution has {} entries, expected {num_tasks}",
        dist.len()
    );
    ensure!(
        dist.iter().all(|p| p.is_finite() && *p >= 0.0),
        "distribution contains negative or non-finite entries: {dist:?}"
    );
    let total: f64 = dist.iter().sum();
    ensure!(
        (total - 1.0).abs() < DIST_TOLERANCE,
        "distribution must sum to 1, got {total}: {dist:?}"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// AnyDistConverter: enum dispatch over the built-in converters
// ---------------------------------------------------------------------------

/// Runtime-selectable converter, built from configuration.
#[derive(Debug, Clone)]
pub enum AnyDistConverter {
    GreedyAmax(GreedyAmaxDist),
    GreedyProp(GreedyPropDist),
    Boltzmann(BoltzmannDist),
}

impl AnyDistConverter {
    pub fn from_config(config: &DistConfig) -> Result<Self> {
        Ok(match *config {
            DistConfig::GreedyAmax { eps } => Self::GreedyAmax(GreedyAmaxDist::new(eps)?),
            DistConfig::GreedyProp { eps } => Self::GreedyProp(GreedyPropDist::new(eps)?),
            DistConfig::Boltzmann { tau } => Self::Boltzmann(BoltzmannDist::new(tau)?),
        })
    }
}

impl DistConverter for AnyDistConverter {
    fn convert(&mut self, attentions: &[f64]) -> Result<Vec<f64>> {
        match self {
            Self::GreedyAmax(c) => c.convert(attentions),
            Self::GreedyProp(c) => c.convert(attentions),
            Self::Boltzmann(c) => c.convert(attentions),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::GreedyAmax(c) => c.name(),
            Self::GreedyProp(c) => c.name(),
            Self::Boltzmann(c) => c.name(),
        }
    }

    fn boxed_clone(&self) -> Box<dyn DistConverter> {
        Box::new(self.clone())
    }
}
