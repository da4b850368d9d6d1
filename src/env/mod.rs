//! Task environment abstractions, concrete tasks and the curriculum wrapper.
//!
//! Every environment implements the [`Environment`] trait so that the training
//! loop can interact with it uniformly.
//!
//! Included environments:
//! - **Skill** ([`skill`]) -- synthetic tasks whose success probability is
//!   chosen by the learner.
//! - **Scripted** ([`scripted`]) -- replays canned reward sequences, for tests.
//! - **MultiEnv** ([`multi`]) -- samples one of several tasks per episode from
//!   a distribution maintained by a [`DistComputer`](crate::computer::DistComputer).

pub mod multi;
pub mod scripted;
pub mod skill;
pub mod traits;

use anyhow::Result;

use crate::config::TaskConfig;

pub use multi::{MultiEnv, TracingObserver, UpdateObserver};
pub use scripted::ScriptedTask;
pub use skill::SkillTask;
pub use traits::{EnvObservation, Environment, RenderMode};

// ---------------------------------------------------------------------------
// AnyEnv: enum dispatch wrapper for dynamic environment selection
// ---------------------------------------------------------------------------

/// An enum wrapper around all concrete task types, enabling runtime task
/// selection without `dyn` (which is incompatible with async trait methods).
#[derive(Debug, Clone)]
pub enum AnyEnv {
    Skill(SkillTask),
    Scripted(ScriptedTask),
}

impl AnyEnv {
    /// Build the task with id `task_id` described by `config`.
    ///
    /// Each task gets its own RNG stream derived from `seed`.
    pub fn from_config(config: &TaskConfig, task_id: usize, seed: u64) -> Result<Self> {
        let env = match config {
            TaskConfig::Skill { horizon } => Self::Skill(SkillTask::new(
                task_id,
                *horizon,
                seed.wrapping_add(task_id as u64 + 1),
            )?),
            TaskConfig::Scripted { episodes } => Self::Scripted(ScriptedTask::new(
                format!("scripted-{task_id}"),
                episodes.clone(),
            )?),
        };
        Ok(env)
    }

    /// One task per graph node.
    pub fn build_all(config: &TaskConfig, num_tasks: usize, seed: u64) -> Result<Vec<Self>> {
        (0..num_tasks)
            .map(|task_id| Self::from_config(config, task_id, seed))
            .collect()
    }
}

impl Environment for AnyEnv {
    async fn reset(&mut self) -> Result<EnvObservation> {
        match self {
            Self::Skill(e) => e.reset().await,
            Self::Scripted(e) => e.reset().await,
        }
    }

    async fn step(&mut self, action: &[f64]) -> Result<EnvObservation> {
        match self {
            Self::Skill(e) => e.step(action).await,
            Self::Scripted(e) => e.step(action).await,
        }
    }

    fn render(&self, mode: RenderMode) -> Result<Option<String>> {
        match self {
            Self::Skill(e) => e.render(mode),
            Self::Scripted(e) => e.render(mode),
        }
    }

    fn task_name(&self) -> &str {
        match self {
            Self::Skill(e) => e.task_name(),
            Self::Scripted(e) => e.task_name(),
        }
    }

    fn max_steps(&self) -> usize {
        match self {
            Self::Skill(e) => e.max_steps(),
            Self::Scripted(e) => e.max_steps(),
        }
    }

    fn is_done(&self) -> bool {
        match self {
            Self::Skill(e) => e.is_done(),
            Self::Scripted(e) => e.is_done(),
        }
    }
}
