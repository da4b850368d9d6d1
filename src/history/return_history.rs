use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Append-only sequence of `(round, return)` pairs for one task.
///
/// Rounds and returns are stored in two parallel vectors so that a trailing
/// window can be handed out as a pair of slices without copying.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnHistory {
    rounds: Vec<usize>,
    returns: Vec<f64>,
}

impl ReturnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, round: usize, value: f64) {
        self.rounds.push(round);
        self.returns.push(value);
    }

    /// The most recent `k` entries, oldest first.
    ///
    /// Asking for more than is available returns everything.
    pub fn last(&self, k: usize) -> (&[usize], &[f64]) {
        let start = self.returns.len().saturating_sub(k);
        (&self.rounds[start..], &self.returns[start..])
    }

    /// The most recent return, if any.
    pub fn latest(&self) -> Option<f64> {
        self.returns.last().copied()
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

/// One [`ReturnHistory`] per task, indexed by task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnHistories {
    tasks: Vec<ReturnHistory>,
}

impl ReturnHistories {
    pub fn new(num_tasks: usize) -> Self {
        Self {
            tasks: vec![ReturnHistory::new(); num_tasks],
        }
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReturnHistory> {
        self.tasks.iter()
    }

    /// Append to one task's history. Unknown task ids are an error.
    pub fn append(&mut self, task: usize, round: usize, value: f64) -> Result<()> {
        let n = self.tasks.len();
        ensure!(task < n, "task id {task} out of range (have {n} tasks)");
        self.tasks[task].append(round, value);
        Ok(())
    }
}

impl std::ops::Index<usize> for ReturnHistories {
    type Output = ReturnHistory;

    fn index(&self, task: usize) -> &ReturnHistory {
        &self.tasks[task]
    }
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
