//! Curriculum training loop.
//!
//! The pipeline wires the configured tasks, distribution computer and learner
//! together and runs them for a fixed number of rounds:
//!
//! ```text
//! for round = 1 .. R:
//!   for episode = 1 .. E:
//!     a. MultiEnv::reset samples a task from the current distribution
//!     b. the learner acts until the episode ends
//!     c. the learner practises the task
//!   MultiEnv::update_distribution -> new distribution
//!   record RoundMetrics
//! ```
//!
//! An episode's return reaches the distribution computer on the reset that
//! follows it, so the last episode of a round is reported in the next round.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::agent::SimulatedLearner;
use crate::computer::DistComputer;
use crate::config::CurriculumConfig;
use crate::env::{AnyEnv, Environment, MultiEnv, TracingObserver};
use crate::graph::TaskGraph;

use super::report::{RoundMetrics, RunReport};

/// Orchestrates a full simulated curriculum run.
pub struct TrainingPipeline {
    config: CurriculumConfig,
    graph: Arc<TaskGraph>,
}

impl TrainingPipeline {
    /// Validate `config` and build its task graph.
    pub fn new(config: CurriculumConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let graph = Arc::new(
            TaskGraph::new(config.graph.num_tasks, &config.graph.edges)
                .context("invalid task graph")?,
        );
        Ok(Self { config, graph })
    }

    /// One configured task per graph node, wrapped in a [`MultiEnv`] driven by
    /// the configured distribution computer.
    pub fn build_env(&self) -> Result<MultiEnv<AnyEnv>> {
        let seed = self.config.training.seed;
        let tasks = AnyEnv::build_all(&self.config.task, self.graph.len(), seed)?;
        let computer = DistComputer::from_config(&self.config, self.graph.clone())?;
        let env = MultiEnv::new(self.graph.clone(), tasks, Some(computer), seed)?
            .with_observer(TracingObserver);
        Ok(env)
    }

    pub fn build_learner(&self) -> Result<SimulatedLearner> {
        SimulatedLearner::new(self.graph.clone(), &self.config.learner)
    }

    /// Run the configured number of rounds and return the full report.
    pub async fn run(&self) -> Result<RunReport> {
        let mut env = self.build_env()?;
        let mut learner = self.build_learner()?;
        self.run_with(&mut env, &mut learner).await
    }

    /// Like [`run`](Self::run), over an environment and learner the caller
    /// keeps for inspection afterwards.
    pub async fn run_with<E: Environment>(
        &self,
        env: &mut MultiEnv<E>,
        learner: &mut SimulatedLearner,
    ) -> Result<RunReport> {
        let computer = env.computer().map_or("none", |c| c.name());

        let graph = env.graph();
        let mut report = RunReport::new(self.config.clone(), graph.summary(), computer);
        info!(
            run_id = %report.run_id,
            computer,
            tasks = graph.len(),
            rounds = self.config.training.rounds,
            episodes_per_round = self.config.training.episodes_per_round,
            "Starting curriculum run"
        );

        report.rounds = self.run_rounds(env, learner).await?;
        report.finish(learner.snapshot());

        if let Some(last) = report.last_round() {
            info!(
                rounds = report.rounds.len(),
                competence = ?last.competence,
                dist = ?last.dist,
                "Curriculum run complete"
            );
        } else {
            info!("Curriculum run complete (no rounds recorded)");
        }
        Ok(report)
    }

    /// The round loop over an already-built environment and learner.
    pub async fn run_rounds<E: Environment>(
        &self,
        env: &mut MultiEnv<E>,
        learner: &mut SimulatedLearner,
    ) -> Result<Vec<RoundMetrics>> {
        let n = env.num_tasks();
        let rounds = self.config.training.rounds;
        let mut metrics = Vec::with_capacity(rounds);

        for round in 1..=rounds {
            let mut episodes = vec![0usize; n];
            let mut return_sums = vec![0.0; n];

            for _ in 0..self.config.training.episodes_per_round {
                let (task, ret) = run_episode(env, learner)
                    .await
                    .with_context(|| format!("episode failed in round {round}"))?;
                episodes[task] += 1;
                return_sums[task] += ret;
            }

            let update = env
                .update_distribution()
                .with_context(|| format!("distribution update failed in round {round}"))?;
            let reported_returns: Vec<(usize, f64)> = update
                .map(|u| u.returns.into_iter().collect())
                .unwrap_or_default();

            let round_metrics = RoundMetrics {
                round,
                mean_returns: episodes
                    .iter()
                    .zip(&return_sums)
                    .map(|(&count, &sum)| (count > 0).then(|| sum / count as f64))
                    .collect(),
                episodes,
                competence: learner.competence().to_vec(),
                dist: env.distribution().to_vec(),
                reported_returns,
            };

            debug!(
                round,
                episodes = ?round_metrics.episodes,
                mean_return = ?round_metrics.overall_return(),
                "Round completed"
            );
            metrics.push(round_metrics);
        }

        Ok(metrics)
    }
}

/// Play one episode on whichever task `env` samples; the learner practises
/// that task afterwards.
///
/// Returns the task id and the episode return.
pub async fn run_episode<E: Environment>(
    env: &mut MultiEnv<E>,
    learner: &mut SimulatedLearner,
) -> Result<(usize, f64)> {
    let mut obs = env.reset().await?;
    let task = env
        .active_task()
        .context("reset did not select a task")?;

    let max_steps = env.max_steps();
    let mut total = 0.0;
    let mut steps = 0;
    while !obs.done {
        if steps >= max_steps {
            warn!(task, steps, "Episode truncated at step limit");
            break;
        }
        obs = env.step(&learner.act(task)).await?;
        total += obs.reward;
        steps += 1;
    }

    learner.learn(task, total)?;
    Ok((task, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComputerConfig, DistConfig, LpConfig, MrParams, TaskConfig};

    fn small_config() -> CurriculumConfig {
        let mut config = CurriculumConfig::default();
        config.graph.num_tasks = 3;
        config.graph.edges = vec![(0, 1), (1, 2)];
        config.task = TaskConfig::Skill { horizon: 5 };
        config.computer = ComputerConfig::Mr(MrParams {
            init_min_returns: vec![0.0; 3],
            init_max_returns: vec![1.0; 3],
            ret_k: 4,
            ext_ret_k: 2,
            power: 6.0,
            pot_prop: 0.5,
            pred_tr: 0.2,
        });
        config.lp = LpConfig::Linreg { k: 4 };
        config.dist = DistConfig::GreedyProp { eps: 0.1 };
        config.learner.learning_rate = 0.2;
        config.training.rounds = 30;
        config.training.episodes_per_round = 10;
        config.training.seed = 7;
        config
    }

    #[tokio::test]
    async fn run_produces_one_metric_per_round() {
        let pipeline = TrainingPipeline::new(small_config()).unwrap();
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.computer, "mr");
        assert_eq!(report.rounds.len(), 30);
        for (i, round) in report.rounds.iter().enumerate() {
            assert_eq!(round.round, i + 1);
            assert_eq!(round.episodes.iter().sum::<usize>(), 10);
            let total: f64 = round.dist.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
        let learner = report.learner.unwrap();
        assert_eq!(learner.episodes.iter().sum::<usize>(), 300);
    }

    #[tokio::test]
    async fn curriculum_moves_past_the_root() {
        let pipeline = TrainingPipeline::new(small_config()).unwrap();
        let report = pipeline.run().await.unwrap();
        let learner = report.learner.unwrap();

        // The root is learned first, and the dependent tasks get practised.
        assert!(learner.competence[0] > 0.9);
        assert!(learner.episodes[1] + learner.episodes[2] > 0);
    }

    #[tokio::test]
    async fn scripted_tasks_report_their_returns() {
        let mut config = small_config();
        config.task = TaskConfig::Scripted {
            episodes: vec![vec![0.25, 0.25]],
        };
        config.training.rounds = 3;
        let pipeline = TrainingPipeline::new(config).unwrap();
        let report = pipeline.run().await.unwrap();

        for round in &report.rounds {
            for (count, mean) in round.episodes.iter().zip(&round.mean_returns) {
                if *count > 0 {
                    assert_eq!(*mean, Some(0.5));
                }
            }
        }
        // Returns of the first round reach the computer at the end of it.
        assert!(!report.rounds[0].reported_returns.is_empty());
    }

    #[test]
    fn invalid_graph_is_rejected() {
        let mut config = small_config();
        config.graph.edges = vec![(0, 1), (1, 2), (2, 0)];
        assert!(TrainingPipeline::new(config).is_err());
    }
}
