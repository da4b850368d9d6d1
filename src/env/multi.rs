//! The multi-task curriculum wrapper.
//!
//! [`MultiEnv`] owns one environment per task of the prerequisite graph. Every
//! `reset` samples the task for the next episode from the current
//! distribution; every `step` forwards to that task and accumulates its
//! reward. Returns pile up per task until [`MultiEnv::update_distribution`]
//! averages them, hands them to the [`DistComputer`] and installs the
//! distribution it computes.
//!
//! ```text
//! reset ──► flush accumulator into pending[active]
//!       ──► sample next task ──► task.reset()
//! step  ──► task.step() ──► accumulator += reward
//! update_distribution ──► mean(pending) ──► DistComputer ──► dist
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use super::traits::{EnvObservation, Environment, RenderMode};
use crate::computer::{CurriculumUpdate, DistComputer};
use crate::dist::validate_distribution;
use crate::graph::TaskGraph;
use crate::history::mean;

// ---------------------------------------------------------------------------
// Update observers
// ---------------------------------------------------------------------------

/// Called after every successful distribution update.
pub trait UpdateObserver: Send + Sync {
    fn on_update(&mut self, update: &CurriculumUpdate);
}

/// Logs each update at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl UpdateObserver for TracingObserver {
    fn on_update(&mut self, update: &CurriculumUpdate) {
        info!(
            round = update.round,
            computer = update.computer,
            tasks_reported = update.returns.len(),
            dist = ?update.dist,
            "curriculum distribution updated"
        );
        if let Some(mastery) = &update.mastery {
            debug!(rates = ?mastery.rates, pots = ?mastery.pots, "mastery signals");
        }
    }
}

// ---------------------------------------------------------------------------
// MultiEnv
// ---------------------------------------------------------------------------

pub struct MultiEnv<E> {
    graph: Arc<TaskGraph>,
    tasks: Vec<E>,
    computer: Option<DistComputer>,
    dist: Vec<f64>,
    rng: StdRng,
    active: Option<usize>,
    /// Return of the running episode; `None` before the first reset.
    accumulator: Option<f64>,
    /// Episode returns collected per task since the last update.
    pending: Vec<Vec<f64>>,
    observer: Option<Box<dyn UpdateObserver>>,
}

impl<E: Environment> MultiEnv<E> {
    /// Wrap one environment per task of `graph`.
    ///
    /// The distribution starts uniform. Without a `computer`,
    /// [`update_distribution`](Self::update_distribution) only clears the
    /// pending returns.
    pub fn new(
        graph: Arc<TaskGraph>,
        tasks: Vec<E>,
        computer: Option<DistComputer>,
        seed: u64,
    ) -> Result<Self> {
        let n = graph.len();
        ensure!(
            tasks.len() == n,
            "got {} environments for a graph of {n} tasks",
            tasks.len()
        );
        if let Some(computer) = &computer {
            ensure!(
                computer.num_tasks() == n,
                "distribution computer covers {} tasks, graph has {n}",
                computer.num_tasks()
            );
        }

        Ok(Self {
            graph,
            tasks,
            computer,
            dist: vec![1.0 / n as f64; n],
            rng: StdRng::seed_from_u64(seed),
            active: None,
            accumulator: None,
            pending: vec![Vec::new(); n],
            observer: None,
        })
    }

    /// Replace the current distribution.
    pub fn with_distribution(mut self, dist: Vec<f64>) -> Result<Self> {
        validate_distribution(&dist, self.tasks.len())?;
        self.dist = dist;
        Ok(self)
    }

    pub fn with_observer(mut self, observer: impl UpdateObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn distribution(&self) -> &[f64] {
        &self.dist
    }

    pub fn active_task(&self) -> Option<usize> {
        self.active
    }

    pub fn accumulated_return(&self) -> Option<f64> {
        self.accumulator
    }

    pub fn pending_returns(&self) -> &[Vec<f64>] {
        &self.pending
    }

    pub fn computer(&self) -> Option<&DistComputer> {
        self.computer.as_ref()
    }

    fn active_env(&self) -> Result<&E> {
        match self.active {
            Some(task) => Ok(&self.tasks[task]),
            None => bail!("no active task; call reset first"),
        }
    }

    fn sample_task(&mut self) -> Result<usize> {
        let sampler = WeightedIndex::new(&self.dist)
            .with_context(|| format!("cannot sample from distribution {:?}", self.dist))?;
        Ok(sampler.sample(&mut self.rng))
    }

    /// Average the pending returns, update the distribution and clear every
    /// pending buffer.
    ///
    /// Tasks without pending returns are left out of the update. On error
    /// nothing changes: the pending buffers and the current distribution are
    /// kept and [`DistComputer::update`] rolls back, so calling this again
    /// submits the same returns exactly once.
    pub fn update_distribution(&mut self) -> Result<Option<CurriculumUpdate>> {
        let Some(computer) = self.computer.as_mut() else {
            self.clear_pending();
            return Ok(None);
        };

        let returns: BTreeMap<usize, f64> = self
            .pending
            .iter()
            .enumerate()
            .filter_map(|(task, rets)| mean(rets).map(|m| (task, m)))
            .collect();

        let update = computer
            .update(&returns)
            .context("distribution update failed")?;
        validate_distribution(&update.dist, self.tasks.len())?;
        self.dist.clone_from(&update.dist);

        if let Some(observer) = self.observer.as_mut() {
            observer.on_update(&update);
        }
        self.clear_pending();
        Ok(Some(update))
    }

    fn clear_pending(&mut self) {
        for rets in &mut self.pending {
            rets.clear();
        }
    }
}

impl<E: Environment> Environment for MultiEnv<E> {
    async fn reset(&mut self) -> Result<EnvObservation> {
        if let (Some(task), Some(ret)) = (self.active, self.accumulator.take()) {
            self.pending[task].push(ret);
        }

        let task = self.sample_task()?;
        let obs = self.tasks[task]
            .reset()
            .await
            .with_context(|| format!("reset of task {task} failed"))?;
        self.active = Some(task);
        self.accumulator = Some(0.0);
        debug!(task, name = self.tasks[task].task_name(), "task selected");
        Ok(obs)
    }

    async fn step(&mut self, action: &[f64]) -> Result<EnvObservation> {
        let Some(task) = self.active else {
            bail!("no active task; call reset first");
        };
        let obs = self.tasks[task].step(action).await?;
        *self.accumulator.get_or_insert(0.0) += obs.reward;
        Ok(obs)
    }

    fn render(&self, mode: RenderMode) -> Result<Option<String>> {
        match self.active {
            Some(task) => self.tasks[task].render(mode),
            None => Ok(None),
        }
    }

    fn task_name(&self) -> &str {
        self.active_env().map_or("none", |e| e.task_name())
    }

    /// The active task's limit, or the largest limit over all tasks before
    /// the first reset.
    fn max_steps(&self) -> usize {
        match self.active_env() {
            Ok(env) => env.max_steps(),
            Err(_) => self.tasks.iter().map(|e| e.max_steps()).max().unwrap_or(0),
        }
    }

    fn is_done(&self) -> bool {
        self.active_env().map_or(true, |e| e.is_done())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::computer::{AnyAttentionComputer, LpDistComputer};
    use crate::dist::{DistConverter, GreedyPropDist};
    use crate::env::ScriptedTask;
    use crate::history::ReturnHistories;
    use crate::lp::LpEstimator;

    fn scripted(rewards: &[f64]) -> Vec<ScriptedTask> {
        rewards
            .iter()
            .enumerate()
            .map(|(i, &r)| ScriptedTask::constant(format!("t{i}"), r).unwrap())
            .collect()
    }

    /// Learning progress equal to the latest return of each task.
    #[derive(Clone)]
    struct LatestReturnLp;

    impl LpEstimator for LatestReturnLp {
        fn estimate(&mut self, histories: &ReturnHistories) -> Result<Vec<f64>> {
            Ok(histories
                .iter()
                .map(|h| h.latest().unwrap_or(0.0))
                .collect())
        }

        fn name(&self) -> &'static str {
            "latest"
        }

        fn boxed_clone(&self) -> Box<dyn LpEstimator> {
            Box::new(self.clone())
        }
    }

    /// Uniform converter that fails while `failures` is above zero.
    #[derive(Clone)]
    struct FlakyDist {
        failures: Arc<AtomicUsize>,
    }

    impl DistConverter for FlakyDist {
        fn convert(&mut self, attentions: &[f64]) -> Result<Vec<f64>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                bail!("converter unavailable");
            }
            let n = attentions.len();
            Ok(vec![1.0 / n as f64; n])
        }

        fn name(&self) -> &'static str {
            "flaky"
        }

        fn boxed_clone(&self) -> Box<dyn DistConverter> {
            Box::new(self.clone())
        }
    }

    fn lp_computer(n: usize) -> DistComputer {
        DistComputer::new(
            AnyAttentionComputer::Lp(LpDistComputer::new(n)),
            Box::new(LatestReturnLp),
            Box::new(GreedyPropDist::new(0.0).unwrap()),
        )
    }

    async fn run_episode(env: &mut MultiEnv<ScriptedTask>) -> f64 {
        env.reset().await.unwrap();
        let mut total = 0.0;
        while !env.is_done() {
            total += env.step(&[]).await.unwrap().reward;
        }
        total
    }

    #[tokio::test]
    async fn point_mass_always_selects_the_same_task() {
        let graph = Arc::new(TaskGraph::chain(2).unwrap());
        let mut env = MultiEnv::new(graph, scripted(&[1.0, 2.0]), None, 42)
            .unwrap()
            .with_distribution(vec![1.0, 0.0])
            .unwrap();
        for _ in 0..100 {
            env.reset().await.unwrap();
            assert_eq!(env.active_task(), Some(0));
        }
    }

    #[tokio::test]
    async fn step_passes_rewards_through_and_accumulates() {
        let graph = Arc::new(TaskGraph::chain(1).unwrap());
        let tasks = vec![ScriptedTask::new("t0", vec![vec![0.5, 0.25, 1.0]]).unwrap()];
        let mut env = MultiEnv::new(graph, tasks, None, 0).unwrap();

        assert!(env.step(&[]).await.is_err());
        env.reset().await.unwrap();
        let mut rewards = Vec::new();
        for _ in 0..3 {
            rewards.push(env.step(&[]).await.unwrap().reward);
        }
        assert_eq!(rewards, vec![0.5, 0.25, 1.0]);
        assert_eq!(env.accumulated_return(), Some(1.75));
        assert!(env.is_done());

        // The next reset files the finished episode under task 0.
        env.reset().await.unwrap();
        assert_eq!(env.pending_returns()[0], vec![1.75]);
        assert_eq!(env.accumulated_return(), Some(0.0));
    }

    #[tokio::test]
    async fn update_averages_pending_returns_and_clears_them() {
        let graph = Arc::new(TaskGraph::new(2, &[]).unwrap());
        let mut env = MultiEnv::new(graph, scripted(&[1.0, 3.0]), Some(lp_computer(2)), 3)
            .unwrap()
            .with_distribution(vec![0.0, 1.0])
            .unwrap();

        run_episode(&mut env).await;
        run_episode(&mut env).await;
        // Flush the second episode.
        env.reset().await.unwrap();
        assert_eq!(env.pending_returns()[1], vec![3.0, 3.0]);

        let update = env.update_distribution().unwrap().unwrap();
        assert_eq!(update.round, 1);
        assert_eq!(update.returns, BTreeMap::from([(1, 3.0)]));
        // Only task 1 has any learning progress.
        assert_eq!(env.distribution(), &[0.0, 1.0]);
        assert!(env.pending_returns().iter().all(Vec::is_empty));
    }

    #[tokio::test]
    async fn failed_update_can_be_retried_without_double_counting() {
        let failures = Arc::new(AtomicUsize::new(1));
        let computer = DistComputer::new(
            AnyAttentionComputer::Lp(LpDistComputer::new(1)),
            Box::new(LatestReturnLp),
            Box::new(FlakyDist {
                failures: failures.clone(),
            }),
        );
        let graph = Arc::new(TaskGraph::chain(1).unwrap());
        let mut env = MultiEnv::new(graph, scripted(&[1.0]), Some(computer), 0).unwrap();
        run_episode(&mut env).await;
        env.reset().await.unwrap();
        assert_eq!(env.pending_returns(), &[vec![1.0]]);

        let err = env.update_distribution().unwrap_err();
        assert!(format!("{err:#}").contains("converter unavailable"));
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert_eq!(env.pending_returns(), &[vec![1.0]]);
        let computer = env.computer().unwrap();
        assert_eq!(computer.round(), 0);
        assert!(computer.histories()[0].is_empty());

        let update = env.update_distribution().unwrap().unwrap();
        assert_eq!(update.round, 1);
        assert_eq!(update.returns, BTreeMap::from([(0, 1.0)]));
        let computer = env.computer().unwrap();
        assert_eq!(computer.round(), 1);
        assert_eq!(computer.histories()[0].last(5), (&[1][..], &[1.0][..]));
        assert!(env.pending_returns().iter().all(Vec::is_empty));
    }

    #[tokio::test]
    async fn update_without_computer_only_clears() {
        let graph = Arc::new(TaskGraph::chain(2).unwrap());
        let mut env = MultiEnv::new(graph, scripted(&[1.0, 1.0]), None, 5).unwrap();
        run_episode(&mut env).await;
        env.reset().await.unwrap();
        assert_eq!(env.pending_returns().iter().map(Vec::len).sum::<usize>(), 1);

        assert!(env.update_distribution().unwrap().is_none());
        assert!(env.pending_returns().iter().all(Vec::is_empty));
        assert_eq!(env.distribution(), &[0.5, 0.5]);
    }

    #[tokio::test]
    async fn observer_sees_every_update() {
        struct Recorder(Arc<Mutex<Vec<usize>>>);

        impl UpdateObserver for Recorder {
            fn on_update(&mut self, update: &CurriculumUpdate) {
                self.0.lock().unwrap().push(update.round);
            }
        }

        let rounds = Arc::new(Mutex::new(Vec::new()));
        let graph = Arc::new(TaskGraph::chain(2).unwrap());
        let mut env = MultiEnv::new(graph, scripted(&[1.0, 1.0]), Some(lp_computer(2)), 9)
            .unwrap()
            .with_observer(Recorder(rounds.clone()));

        env.update_distribution().unwrap();
        env.update_distribution().unwrap();
        assert_eq!(*rounds.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn rejects_mismatched_task_count_and_bad_distribution() {
        let graph = Arc::new(TaskGraph::chain(3).unwrap());
        assert!(MultiEnv::new(graph.clone(), scripted(&[1.0, 1.0]), None, 0).is_err());
        assert!(MultiEnv::new(graph.clone(), scripted(&[1.0; 3]), Some(lp_computer(2)), 0).is_err());

        let env = || MultiEnv::new(graph.clone(), scripted(&[1.0; 3]), None, 0).unwrap();
        assert!(env().with_distribution(vec![0.0, 0.0, 0.0]).is_err());
        assert!(env().with_distribution(vec![0.5, 0.5]).is_err());
        assert!(env().with_distribution(vec![-0.5, 0.5, 1.0]).is_err());

        // Weights that do not sum to one are not a distribution.
        let err = env().with_distribution(vec![0.3, 0.3, 0.3]).err().unwrap();
        assert!(err.to_string().contains("must sum to 1"));
        assert!(env().with_distribution(vec![0.5, 0.5, 0.5]).is_err());
        assert!(env().with_distribution(vec![0.2, 0.3, 0.5]).is_ok());

        let pair = Arc::new(TaskGraph::new(2, &[]).unwrap());
        let env = MultiEnv::new(pair, scripted(&[1.0; 2]), None, 0).unwrap();
        assert!(env.with_distribution(vec![0.3, 0.3]).is_err());
    }

    #[tokio::test]
    async fn delegates_capabilities_to_the_active_task() {
        let graph = Arc::new(TaskGraph::chain(2).unwrap());
        let mut env = MultiEnv::new(graph, scripted(&[1.0, 1.0]), None, 0)
            .unwrap()
            .with_distribution(vec![0.0, 1.0])
            .unwrap();
        assert_eq!(env.task_name(), "none");
        assert!(env.is_done());
        assert_eq!(env.render(RenderMode::Text).unwrap(), None);

        env.reset().await.unwrap();
        assert_eq!(env.task_name(), "t1");
        assert!(!env.is_done());
        assert_eq!(env.max_steps(), 1);
        assert_eq!(
            env.render(RenderMode::Text).unwrap().as_deref(),
            Some("t1 episode 0 step 0")
        );
    }
}
