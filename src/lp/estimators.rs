use anyhow::{ensure, Result};

use super::LpEstimator;
use crate::history::ReturnHistories;

/// Least-squares slope of `ys` against `xs`.
///
/// Returns `None` with fewer than two points, and `0.0` when every `x` is the
/// same (a vertical fit carries no progress information).
pub fn least_squares_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }

    let nf = n as f64;
    let mean_x = xs[..n].iter().sum::<f64>() / nf;
    let mean_y = ys[..n].iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        cov += (x - mean_x) * (y - mean_y);
        var += (x - mean_x).powi(2);
    }

    if var == 0.0 {
        return Some(0.0);
    }
    Some(cov / var)
}

fn window_slope(histories: &ReturnHistories, task: usize, k: usize) -> Option<f64> {
    let (rounds, returns) = histories[task].last(k);
    let xs: Vec<f64> = rounds.iter().map(|&r| r as f64).collect();
    least_squares_slope(&xs, returns)
}

fn ensure_len(lps: &mut Vec<f64>, num_tasks: usize) {
    if lps.len() != num_tasks {
        lps.resize(num_tasks, 0.0);
    }
}

// ---------------------------------------------------------------------------
// Online
// ---------------------------------------------------------------------------

/// Exponentially smoothed slope between the two most recent returns.
///
///   lp(i) <- alpha * slope_2(i) + (1 - alpha) * lp(i)
#[derive(Debug, Clone)]
pub struct OnlineLp {
    alpha: f64,
    lps: Vec<f64>,
}

impl OnlineLp {
    pub fn new(alpha: f64) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&alpha),
            "online LP smoothing factor must lie in [0, 1], got {alpha}"
        );
        Ok(Self {
            alpha,
            lps: Vec::new(),
        })
    }
}

impl LpEstimator for OnlineLp {
    fn estimate(&mut self, histories: &ReturnHistories) -> Result<Vec<f64>> {
        ensure_len(&mut self.lps, histories.num_tasks());
        for task in 0..histories.num_tasks() {
            if let Some(slope) = window_slope(histories, task, 2) {
                self.lps[task] = self.alpha * slope + (1.0 - self.alpha) * self.lps[task];
            }
        }
        Ok(self.lps.clone())
    }

    fn name(&self) -> &'static str {
        "online"
    }

    fn boxed_clone(&self) -> Box<dyn LpEstimator> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// Exponentially smoothed least-squares slope over the last `k` returns.
#[derive(Debug, Clone)]
pub struct WindowLp {
    alpha: f64,
    k: usize,
    lps: Vec<f64>,
}

impl WindowLp {
    pub fn new(alpha: f64, k: usize) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&alpha),
            "window LP smoothing factor must lie in [0, 1], got {alpha}"
        );
        ensure!(k >= 2, "window LP needs a window of at least 2, got {k}");
        Ok(Self {
            alpha,
            k,
            lps: Vec::new(),
        })
    }
}

impl LpEstimator for WindowLp {
    fn estimate(&mut self, histories: &ReturnHistories) -> Result<Vec<f64>> {
        ensure_len(&mut self.lps, histories.num_tasks());
        for task in 0..histories.num_tasks() {
            if let Some(slope) = window_slope(histories, task, self.k) {
                self.lps[task] = self.alpha * slope + (1.0 - self.alpha) * self.lps[task];
            }
        }
        Ok(self.lps.clone())
    }

    fn name(&self) -> &'static str {
        "window"
    }

    fn boxed_clone(&self) -> Box<dyn LpEstimator> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Linear regression
// ---------------------------------------------------------------------------

/// Raw least-squares slope over the last `k` returns.
///
/// Tasks with fewer than two returns keep their previous estimate (initially 0).
#[derive(Debug, Clone)]
pub struct LinregLp {
    k: usize,
    lps: Vec<f64>,
}

impl LinregLp {
    pub fn new(k: usize) -> Result<Self> {
        ensure!(k >= 2, "linreg LP needs a window of at least 2, got {k}");
        Ok(Self { k, lps: Vec::new() })
    }
}

impl LpEstimator for LinregLp {
    fn estimate(&mut self, histories: &ReturnHistories) -> Result<Vec<f64>> {
        ensure_len(&mut self.lps, histories.num_tasks());
        for task in 0..histories.num_tasks() {
            if let Some(slope) = window_slope(histories, task, self.k) {
                self.lps[task] = slope;
            }
        }
        Ok(self.lps.clone())
    }

    fn name(&self) -> &'static str {
        "linreg"
    }

    fn boxed_clone(&self) -> Box<dyn LpEstimator> {
        Box::new(self.clone())
    }
}
