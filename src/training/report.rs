//! Per-round metrics and the JSON run report written by `simulate`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::LearnerSnapshot;
use crate::config::CurriculumConfig;
use crate::graph::GraphSummary;

/// What happened during one round of the training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    /// 1-based round index.
    pub round: usize,
    /// Episodes finished on each task during this round.
    pub episodes: Vec<usize>,
    /// Mean return of those episodes; `None` for tasks not played.
    pub mean_returns: Vec<Option<f64>>,
    /// Learner competence at the end of the round.
    pub competence: Vec<f64>,
    /// Distribution installed by the update at the end of the round.
    pub dist: Vec<f64>,
    /// Returns the distribution computer was fed, keyed by task id.
    #[serde(default)]
    pub reported_returns: Vec<(usize, f64)>,
}

impl RoundMetrics {
    /// Mean return over every episode of the round.
    pub fn overall_return(&self) -> Option<f64> {
        let (sum, count) = self
            .episodes
            .iter()
            .zip(&self.mean_returns)
            .filter_map(|(&n, m)| m.map(|m| (m * n as f64, n)))
            .fold((0.0, 0), |(s, c), (x, n)| (s + x, c + n));
        (count > 0).then(|| sum / count as f64)
    }
}

/// A complete record of one simulated curriculum run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub computer: String,
    pub config: CurriculumConfig,
    pub graph: GraphSummary,
    pub rounds: Vec<RoundMetrics>,
    pub learner: Option<LearnerSnapshot>,
}

impl RunReport {
    pub fn new(config: CurriculumConfig, graph: GraphSummary, computer: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            computer: computer.to_string(),
            config,
            graph,
            rounds: Vec::new(),
            learner: None,
        }
    }

    pub fn finish(&mut self, learner: LearnerSnapshot) {
        self.learner = Some(learner);
        self.finished_at = Some(Utc::now());
    }

    pub fn last_round(&self) -> Option<&RoundMetrics> {
        self.rounds.last()
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
        tracing::info!(path = %path.display(), rounds = self.rounds.len(), "Saved run report");
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run report from {}", path.display()))?;
        serde_json::from_str(&data).context("Failed to deserialize run report JSON")
    }
}
