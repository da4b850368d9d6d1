//! Core environment trait and shared types.
//!
//! Every task implements the [`Environment`] trait so that the training loop
//! and the [`MultiEnv`](super::MultiEnv) wrapper can drive episodes uniformly.

use serde::{Deserialize, Serialize};

/// An observation returned by the environment after a reset or step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvObservation {
    /// Numeric observation vector the learner sees.
    pub observation: Vec<f64>,
    /// The scalar reward for the transition that produced this observation.
    pub reward: f64,
    /// Whether the episode has terminated.
    pub done: bool,
    /// Arbitrary extra information from the environment (task-specific).
    pub info: serde_json::Value,
}

/// Output format for [`Environment::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// One human-readable line.
    Text,
    /// A JSON object.
    Json,
}

/// The core environment trait.
///
/// A [`MultiEnv`](super::MultiEnv) implements it as well, forwarding every
/// call to the currently active task, so a training loop never needs to know
/// whether it drives a single task or a curriculum.
#[allow(async_fn_in_trait)]
pub trait Environment: Send + Sync {
    /// Start a new episode and return its initial observation.
    async fn reset(&mut self) -> anyhow::Result<EnvObservation>;

    /// Execute an action in the environment and return the resulting observation.
    async fn step(&mut self, action: &[f64]) -> anyhow::Result<EnvObservation>;

    /// Render the current state, or `None` when there is nothing to show yet.
    fn render(&self, mode: RenderMode) -> anyhow::Result<Option<String>>;

    /// Short label of the current task.
    fn task_name(&self) -> &str;

    /// The maximum number of steps allowed in an episode.
    fn max_steps(&self) -> usize;

    /// Whether the current episode has ended.
    fn is_done(&self) -> bool;
}
