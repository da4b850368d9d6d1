use anyhow::{ensure, Result};
use ordered_float::OrderedFloat;

use super::{check_attentions, DistConverter};

fn check_eps(eps: f64) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&eps),
        "exploration rate must lie in [0, 1], got {eps}"
    );
    Ok(())
}

/// `eps / N` exploration everywhere, the remaining `1 - eps` on the argmax.
///
/// Ties go to the lowest task id.
#[derive(Debug, Clone)]
pub struct GreedyAmaxDist {
    eps: f64,
}

impl GreedyAmaxDist {
    pub fn new(eps: f64) -> Result<Self> {
        check_eps(eps)?;
        Ok(Self { eps })
    }
}

impl DistConverter for GreedyAmaxDist {
    fn convert(&mut self, attentions: &[f64]) -> Result<Vec<f64>> {
        check_attentions(attentions)?;
        let n = attentions.len() as f64;
        // max_by_key keeps the last maximum, so scan in reverse.
        let best = attentions
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|&(_, &a)| OrderedFloat(a))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut dist = vec![self.eps / n; attentions.len()];
        dist[best] += 1.0 - self.eps;
        Ok(dist)
    }

    fn name(&self) -> &'static str {
        "greedy_amax"
    }

    fn boxed_clone(&self) -> Box<dyn DistConverter> {
        Box::new(self.clone())
    }
}

/// `eps / N` exploration plus `(1 - eps)` spread proportionally to attention.
///
/// An all-zero attention vector yields the uniform distribution.
#[derive(Debug, Clone)]
pub struct GreedyPropDist {
    eps: f64,
}

impl GreedyPropDist {
    pub fn new(eps: f64) -> Result<Self> {
        check_eps(eps)?;
        Ok(Self { eps })
    }
}

impl DistConverter for GreedyPropDist {
    fn convert(&mut self, attentions: &[f64]) -> Result<Vec<f64>> {
        check_attentions(attentions)?;
        let n = attentions.len() as f64;
        let total: f64 = attentions.iter().sum();
        if total == 0.0 {
            return Ok(vec![1.0 / n; attentions.len()]);
        }
        Ok(attentions
            .iter()
            .map(|a| self.eps / n + (1.0 - self.eps) * a / total)
            .collect())
    }

    fn name(&self) -> &'static str {
        "greedy_prop"
    }

    fn boxed_clone(&self) -> Box<dyn DistConverter> {
        Box::new(self.clone())
    }
}

/// Softmax of `attention / tau`.
#[derive(Debug, Clone)]
pub struct BoltzmannDist {
    tau: f64,
}

impl BoltzmannDist {
    pub fn new(tau: f64) -> Result<Self> {
        ensure!(
            tau.is_finite() && tau > 0.0,
            "Boltzmann temperature must be positive, got {tau}"
        );
        Ok(Self { tau })
    }
}

impl DistConverter for BoltzmannDist {
    fn convert(&mut self, attentions: &[f64]) -> Result<Vec<f64>> {
        check_attentions(attentions)?;
        let max = attentions
            .iter()
            .copied()
            .map(OrderedFloat)
            .max()
            .map(|m| m.0)
            .unwrap_or(0.0);
        let exps: Vec<f64> = attentions
            .iter()
            .map(|a| ((a - max) / self.tau).exp())
            .collect();
        let total: f64 = exps.iter().sum();
        Ok(exps.into_iter().map(|e| e / total).collect())
    }

    fn name(&self) -> &'static str {
        "boltzmann"
    }

    fn boxed_clone(&self) -> Box<dyn DistConverter> {
        Box::new(self.clone())
    }
}
