//! A learner whose competence follows the prerequisite graph.
//!
//! Acting: on task `i` the learner submits its competence `c(i)` as the
//! per-step success probability (see [`SkillTask`](crate::env::SkillTask)).
//!
//! Learning: after every episode on task `i`,
//!
//!   c(i) += lr * readiness(i) * (1 - c(i))
//!
//! where `readiness(i)` is the lowest competence among the direct
//! predecessors of `i` (1 for roots). Practising a task whose prerequisites
//! are unlearned is therefore mostly wasted.

use std::sync::Arc;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LearnerConfig;
use crate::graph::TaskGraph;

#[derive(Debug, Clone)]
pub struct SimulatedLearner {
    graph: Arc<TaskGraph>,
    competence: Vec<f64>,
    learning_rate: f64,
    episodes: Vec<usize>,
    return_sums: Vec<f64>,
}

/// Per-task counters accumulated by the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerSnapshot {
    pub competence: Vec<f64>,
    pub episodes: Vec<usize>,
    /// Mean episode return per task; `None` for tasks never played.
    pub mean_returns: Vec<Option<f64>>,
}

impl SimulatedLearner {
    pub fn new(graph: Arc<TaskGraph>, config: &LearnerConfig) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&config.learning_rate),
            "learning rate must lie in [0, 1], got {}",
            config.learning_rate
        );
        ensure!(
            (0.0..=1.0).contains(&config.initial_competence),
            "initial competence must lie in [0, 1], got {}",
            config.initial_competence
        );
        let n = graph.len();
        Ok(Self {
            graph,
            competence: vec![config.initial_competence; n],
            learning_rate: config.learning_rate,
            episodes: vec![0; n],
            return_sums: vec![0.0; n],
        })
    }

    /// The action for one step of `task`.
    pub fn act(&self, task: usize) -> Vec<f64> {
        vec![self.competence[task]]
    }

    pub fn competence(&self) -> &[f64] {
        &self.competence
    }

    pub fn readiness(&self, task: usize) -> f64 {
        self.graph
            .predecessors(task)
            .into_iter()
            .map(|p| self.competence[p])
            .fold(1.0, f64::min)
    }

    /// Record one finished episode on `task` and practise it.
    pub fn learn(&mut self, task: usize, episode_return: f64) -> Result<()> {
        ensure!(
            task < self.competence.len(),
            "learner has no task {task}"
        );
        ensure!(
            episode_return.is_finite(),
            "episode return for task {task} is not finite"
        );

        let readiness = self.readiness(task);
        let c = &mut self.competence[task];
        *c += self.learning_rate * readiness * (1.0 - *c);
        self.episodes[task] += 1;
        self.return_sums[task] += episode_return;

        debug!(task, readiness, competence = *c, episode_return, "learner updated");
        Ok(())
    }

    pub fn snapshot(&self) -> LearnerSnapshot {
        LearnerSnapshot {
            competence: self.competence.clone(),
            episodes: self.episodes.clone(),
            mean_returns: self
                .episodes
                .iter()
                .zip(&self.return_sums)
                .map(|(&n, &sum)| (n > 0).then(|| sum / n as f64))
                .collect(),
        }
    }
}
