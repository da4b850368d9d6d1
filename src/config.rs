use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Complete configuration for a curriculum run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumConfig {
    pub graph: GraphConfig,
    pub task: TaskConfig,
    pub computer: ComputerConfig,
    pub lp: LpConfig,
    pub dist: DistConfig,
    pub learner: LearnerConfig,
    pub training: TrainingConfig,
}

/// The prerequisite DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Number of tasks; task ids are `0..num_tasks`.
    pub num_tasks: usize,
    /// `(prerequisite, dependent)` pairs.
    pub edges: Vec<(usize, usize)>,
}

/// Which environment backs every task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskConfig {
    /// Synthetic skill task (see `env::skill`).
    Skill {
        /// Steps per episode (default: 10).
        horizon: usize,
    },
    /// Replays fixed reward sequences (see `env::scripted`).
    Scripted {
        /// Canned per-step rewards, one inner vector per episode.
        episodes: Vec<Vec<f64>>,
    },
}

/// Attention computer selection and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComputerConfig {
    /// Absolute learning progress only.
    Lp,
    /// Mastering rate with ancestor/successor gating and redistribution.
    Mr(MrParams),
    /// Absolute learning progress plus weighted potential.
    LpPot(LpPotParams),
    /// LP plus potential, filtered by ancestor mastery.
    LpPotRr(LpPotRrParams),
    /// Normalized LP and potential, gated by ancestors and successors, redistributed.
    NlpPotMancRd(NlpPotMancRdParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrParams {
    /// Initial lower return bound per task.
    pub init_min_returns: Vec<f64>,
    /// Initial upper return bound per task.
    pub init_max_returns: Vec<f64>,
    /// Window for the representative return (default: 10).
    pub ret_k: usize,
    /// Window for the bound update; must not exceed `ret_k` (default: 5).
    pub ext_ret_k: usize,
    /// Exponent on the ancestor gate (default: 6).
    pub power: f64,
    /// Weight of potential against normalized LP, in `[0, 1]` (default: 0.5).
    pub pot_prop: f64,
    /// Fraction of attention passed to predecessors, in `[0, 1]` (default: 0.2).
    pub pred_tr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpPotParams {
    pub init_min_returns: Vec<f64>,
    pub init_max_returns: Vec<f64>,
    /// Weight of potential added to absolute LP (default: 1.0).
    pub pot_coef: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpPotRrParams {
    pub ret_k: usize,
    pub ext_ret_k: usize,
    pub pot_coef: f64,
    #[serde(default)]
    pub init_min_returns: Option<Vec<f64>>,
    #[serde(default)]
    pub init_max_returns: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlpPotMancRdParams {
    pub ret_k: usize,
    pub ext_ret_k: usize,
    pub power: f64,
    pub pot_prop: f64,
    /// Fraction of attention passed to predecessors, in `[0, 1]`.
    pub tr: f64,
    #[serde(default)]
    pub init_min_returns: Option<Vec<f64>>,
    #[serde(default)]
    pub init_max_returns: Option<Vec<f64>>,
}

/// Learning-progress estimator selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LpConfig {
    Online { alpha: f64 },
    Window { alpha: f64, k: usize },
    Linreg { k: usize },
}

/// Attention-to-distribution converter selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistConfig {
    GreedyAmax { eps: f64 },
    GreedyProp { eps: f64 },
    Boltzmann { tau: f64 },
}

/// Simulated learner used by the `simulate` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Competence gain per episode at full readiness (default: 0.05).
    pub learning_rate: f64,
    /// Competence every task starts at (default: 0.05).
    pub initial_competence: f64,
}

/// Outer training-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of distribution updates (default: 100).
    pub rounds: usize,
    /// Episodes collected between two updates (default: 20).
    pub episodes_per_round: usize,
    /// Seed for task sampling and environment noise (default: 1).
    pub seed: u64,
}

impl CurriculumConfig {
    /// Cross-field checks that serde cannot express.
    ///
    /// Per-component parameter checks (windows, ratios, temperatures) happen
    /// when the components are built.
    pub fn validate(&self) -> Result<()> {
        let n = self.graph.num_tasks;
        ensure!(n > 0, "graph.num_tasks must be positive");

        let bound_lens: Vec<usize> = match &self.computer {
            ComputerConfig::Lp => Vec::new(),
            ComputerConfig::Mr(p) => vec![p.init_min_returns.len(), p.init_max_returns.len()],
            ComputerConfig::LpPot(p) => vec![p.init_min_returns.len(), p.init_max_returns.len()],
            ComputerConfig::LpPotRr(p) => [&p.init_min_returns, &p.init_max_returns]
                .into_iter()
                .flatten()
                .map(Vec::len)
                .collect(),
            ComputerConfig::NlpPotMancRd(p) => [&p.init_min_returns, &p.init_max_returns]
                .into_iter()
                .flatten()
                .map(Vec::len)
                .collect(),
        };
        for len in bound_lens {
            ensure!(
                len == n,
                "initial return bounds have {len} entries but the graph has {n} tasks"
            );
        }

        match &self.task {
            TaskConfig::Skill { horizon } => ensure!(*horizon > 0, "task.horizon must be positive"),
            TaskConfig::Scripted { episodes } => ensure!(
                !episodes.is_empty() && episodes.iter().all(|e| !e.is_empty()),
                "scripted tasks need at least one non-empty episode"
            ),
        }

        ensure!(
            self.training.episodes_per_round > 0,
            "training.episodes_per_round must be positive"
        );
        ensure!(
            (0.0..=1.0).contains(&self.learner.learning_rate),
            "learner.learning_rate must lie in [0, 1]"
        );
        ensure!(
            (0.0..=1.0).contains(&self.learner.initial_competence),
            "learner.initial_competence must lie in [0, 1]"
        );
        Ok(())
    }
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        let num_tasks = 5;
        Self {
            graph: GraphConfig {
                num_tasks,
                edges: (1..num_tasks).map(|t| (t - 1, t)).collect(),
            },
            task: TaskConfig::Skill { horizon: 10 },
            computer: ComputerConfig::Mr(MrParams {
                init_min_returns: vec![0.0; num_tasks],
                init_max_returns: vec![1.0; num_tasks],
                ret_k: 10,
                ext_ret_k: 5,
                power: 6.0,
                pot_prop: 0.5,
                pred_tr: 0.2,
            }),
            lp: LpConfig::Linreg { k: 10 },
            dist: DistConfig::GreedyProp { eps: 0.1 },
            learner: LearnerConfig {
                learning_rate: 0.05,
                initial_competence: 0.05,
            },
            training: TrainingConfig {
                rounds: 100,
                episodes_per_round: 20,
                seed: 1,
            },
        }
    }
}
