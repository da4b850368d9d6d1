//! Synthetic skill task.
//!
//! Each step the learner submits a single number `p`, its probability of
//! performing the skill correctly. The step succeeds with probability `p` and
//! pays `1 / horizon`, so the episode return is the success fraction and lies
//! in `[0, 1]`. Episodes always last exactly `horizon` steps.

use anyhow::{bail, ensure, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::traits::{EnvObservation, Environment, RenderMode};

#[derive(Debug, Clone)]
pub struct SkillTask {
    task_id: usize,
    name: String,
    horizon: usize,
    rng: StdRng,
    step_index: usize,
    episode_return: f64,
    /// False until the first reset.
    started: bool,
    done: bool,
}

impl SkillTask {
    pub fn new(task_id: usize, horizon: usize, seed: u64) -> Result<Self> {
        ensure!(horizon > 0, "skill task horizon must be positive");
        Ok(Self {
            task_id,
            name: format!("skill-{task_id}"),
            horizon,
            rng: StdRng::seed_from_u64(seed),
            step_index: 0,
            episode_return: 0.0,
            started: false,
            done: false,
        })
    }

    fn observation(&self, reward: f64) -> EnvObservation {
        EnvObservation {
            observation: vec![self.task_id as f64, self.progress()],
            reward,
            done: self.done,
            info: serde_json::json!({
                "task_id": self.task_id,
                "step": self.step_index,
            }),
        }
    }

    fn progress(&self) -> f64 {
        self.step_index as f64 / self.horizon as f64
    }
}

impl Environment for SkillTask {
    async fn reset(&mut self) -> Result<EnvObservation> {
        self.step_index = 0;
        self.episode_return = 0.0;
        self.started = true;
        self.done = false;
        Ok(self.observation(0.0))
    }

    async fn step(&mut self, action: &[f64]) -> Result<EnvObservation> {
        if !self.started || self.done {
            bail!("cannot step {} outside of a running episode", self.name);
        }
        let Some(&p) = action.first() else {
            bail!("skill task expects a one-element action, got an empty one");
        };
        ensure!(p.is_finite(), "skill task action must be finite, got {p}");

        let success = self.rng.gen_bool(p.clamp(0.0, 1.0));
        let reward = if success { 1.0 / self.horizon as f64 } else { 0.0 };

        self.step_index += 1;
        self.episode_return += reward;
        self.done = self.step_index >= self.horizon;
        Ok(self.observation(reward))
    }

    fn render(&self, mode: RenderMode) -> Result<Option<String>> {
        if !self.started {
            return Ok(None);
        }
        let text = match mode {
            RenderMode::Text => format!(
                "{} step {}/{} return {:.3}{}",
                self.name,
                self.step_index,
                self.horizon,
                self.episode_return,
                if self.done { " (done)" } else { "" }
            ),
            RenderMode::Json => serde_json::json!({
                "task": self.name,
                "step": self.step_index,
                "horizon": self.horizon,
                "return": self.episode_return,
                "done": self.done,
            })
            .to_string(),
        };
        Ok(Some(text))
    }

    fn task_name(&self) -> &str {
        &self.name
    }

    fn max_steps(&self) -> usize {
        self.horizon
    }

    fn is_done(&self) -> bool {
        self.done
    }
}
