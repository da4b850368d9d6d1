//! Learning-progress estimation.
//!
//! A learning-progress estimator reads the return histories and produces one
//! signed scalar per task: how fast the return on that task is currently
//! changing. The attention computers only ever look at its absolute value.
//!
//! Included estimators:
//! - [`OnlineLp`] -- slope between the two most recent returns, smoothed.
//! - [`WindowLp`] -- least-squares slope over a trailing window, smoothed.
//! - [`LinregLp`] -- least-squares slope over a trailing window, raw.

pub mod estimators;

use anyhow::Result;

use crate::config::LpConfig;
use crate::history::ReturnHistories;

pub use estimators::{least_squares_slope, LinregLp, OnlineLp, WindowLp};

/// Produces one learning-progress value per task.
pub trait LpEstimator: Send + Sync {
    /// Estimate learning progress from the current histories.
    ///
    /// The returned vector must have one entry per task, in task-id order.
    fn estimate(&mut self, histories: &ReturnHistories) -> Result<Vec<f64>>;

    /// Short label used in logs and reports.
    fn name(&self) -> &'static str;

    /// Clone behind the trait object, including any smoothing state.
    fn boxed_clone(&self) -> Box<dyn LpEstimator>;
}

// ---------------------------------------------------------------------------
// AnyLpEstimator: enum dispatch over the built-in estimators
// ---------------------------------------------------------------------------

/// Runtime-selectable estimator, built from configuration.
#[derive(Debug, Clone)]
pub enum AnyLpEstimator {
    Online(OnlineLp),
    Window(WindowLp),
    Linreg(LinregLp),
}

impl AnyLpEstimator {
    pub fn from_config(config: &LpConfig) -> Result<Self> {
        Ok(match *config {
            LpConfig::Online { alpha } => Self::Online(OnlineLp::new(alpha)?),
            LpConfig::Window { alpha, k } => Self::Window(WindowLp::new(alpha, k)?),
            LpConfig::Linreg { k } => Self::Linreg(LinregLp::new(k)?),
        })
    }
}

impl LpEstimator for AnyLpEstimator {
    fn estimate(&mut self, histories: &ReturnHistories) -> Result<Vec<f64>> {
        match self {
            Self::Online(e) => e.estimate(histories),
            Self::Window(e) => e.estimate(histories),
            Self::Linreg(e) => e.estimate(histories),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Online(e) => e.name(),
            Self::Window(e) => e.name(),
            Self::Linreg(e) => e.name(),
        }
    }

    fn boxed_clone(&self) -> Box<dyn LpEstimator> {
        Box::new(self.clone())
    }
}
