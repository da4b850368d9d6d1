//! A task that replays canned reward sequences.
//!
//! Useful for deterministic tests of the multi-environment wrapper and the
//! training loop: the rewards are fixed in advance and ignore the action.

use anyhow::{bail, ensure, Result};

use super::traits::{EnvObservation, Environment, RenderMode};

/// Replays one reward sequence per episode, cycling through `episodes`.
#[derive(Debug, Clone)]
pub struct ScriptedTask {
    name: String,
    /// Per-step rewards, one inner vector per episode.
    episodes: Vec<Vec<f64>>,
    /// Index of the next episode to play.
    episode_index: usize,
    /// Episode currently being played, if any.
    current: Option<usize>,
    /// Index of the next step within the current episode.
    step_index: usize,
    done: bool,
}

impl ScriptedTask {
    pub fn new(name: impl Into<String>, episodes: Vec<Vec<f64>>) -> Result<Self> {
        ensure!(
            !episodes.is_empty() && episodes.iter().all(|e| !e.is_empty()),
            "a scripted task needs at least one non-empty episode"
        );
        ensure!(
            episodes.iter().flatten().all(|r| r.is_finite()),
            "scripted rewards must be finite"
        );
        Ok(Self {
            name: name.into(),
            episodes,
            episode_index: 0,
            current: None,
            step_index: 0,
            done: false,
        })
    }

    /// A task whose every episode is a single step paying `reward`.
    pub fn constant(name: impl Into<String>, reward: f64) -> Result<Self> {
        Self::new(name, vec![vec![reward]])
    }

    /// Number of episodes started so far.
    pub fn episodes_played(&self) -> usize {
        self.episode_index
    }

    fn observation(&self, reward: f64) -> EnvObservation {
        EnvObservation {
            observation: vec![self.step_index as f64],
            reward,
            done: self.done,
            info: serde_json::Value::Null,
        }
    }
}

impl Environment for ScriptedTask {
    async fn reset(&mut self) -> Result<EnvObservation> {
        self.current = Some(self.episode_index % self.episodes.len());
        self.episode_index += 1;
        self.step_index = 0;
        self.done = false;
        Ok(self.observation(0.0))
    }

    async fn step(&mut self, _action: &[f64]) -> Result<EnvObservation> {
        let Some(episode) = self.current else {
            bail!("{} was stepped before reset", self.name);
        };
        if self.done {
            bail!("cannot step {} in a terminated episode", self.name);
        }
        let rewards = &self.episodes[episode];
        let reward = rewards[self.step_index];
        self.step_index += 1;
        self.done = self.step_index >= rewards.len();
        Ok(self.observation(reward))
    }

    fn render(&self, mode: RenderMode) -> Result<Option<String>> {
        let Some(episode) = self.current else {
            return Ok(None);
        };
        let text = match mode {
            RenderMode::Text => format!(
                "{} episode {} step {}",
                self.name, episode, self.step_index
            ),
            RenderMode::Json => serde_json::json!({
                "task": self.name,
                "episode": episode,
                "step": self.step_index,
            })
            .to_string(),
        };
        Ok(Some(text))
    }

    fn task_name(&self) -> &str {
        &self.name
    }

    fn max_steps(&self) -> usize {
        self.episodes.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_episodes_in_order_and_cycles() {
        let mut task = ScriptedTask::new("t", vec![vec![1.0, 2.0], vec![5.0]]).unwrap();
        let mut returns = Vec::new();
        for _ in 0..3 {
            task.reset().await.unwrap();
            let mut total = 0.0;
            while !task.is_done() {
                total += task.step(&[]).await.unwrap().reward;
            }
            returns.push(total);
        }
        assert_eq!(returns, vec![3.0, 5.0, 3.0]);
        assert_eq!(task.episodes_played(), 3);
        assert_eq!(task.max_steps(), 2);
    }

    #[tokio::test]
    async fn step_requires_a_running_episode() {
        let mut task = ScriptedTask::constant("t", 1.0).unwrap();
        assert!(task.step(&[]).await.is_err());
        task.reset().await.unwrap();
        task.step(&[]).await.unwrap();
        assert!(task.step(&[]).await.is_err());
    }

    #[test]
    fn rejects_empty_scripts() {
        assert!(ScriptedTask::new("t", vec![]).is_err());
        assert!(ScriptedTask::new("t", vec![vec![]]).is_err());
    }
}
