//! Distribution computers: from per-task returns to a task distribution.
//!
//! A [`DistComputer`] runs in two phases on every update:
//!
//! 1. **Ingest** -- advance the round counter and append the new per-task
//!    returns to the histories. This step is fixed and identical for every
//!    variant.
//! 2. **Attend** -- estimate learning progress, let the configured
//!    [`AttentionComputer`] turn histories and learning progress into one
//!    attention per task, and convert the attentions into a distribution.
//!
//! ```text
//! returns ──► ingest ──► histories ──► LpEstimator ──► lps
//!                             │                          │
//!                             └──► AttentionComputer ◄───┘
//!                                        │
//!                                   attentions ──► DistConverter ──► dist
//! ```
//!
//! Variants:
//! - [`LpDistComputer`] -- absolute learning progress.
//! - [`MrDistComputer`] -- mastering rate, ancestor/successor gates, redistribution.
//! - [`LpPotDistComputer`] -- LP plus potential.
//! - [`LpPotRrDistComputer`] -- LP plus potential, ancestor filter.
//! - [`NlpPotMancRdDistComputer`] -- normalized LP and potential, both gates,
//!   redistribution, two-stage bounds.

pub mod bounds;
pub mod gating;
pub mod lp;
pub mod lp_pot;
pub mod lp_pot_rr;
pub mod mr;
pub mod nlp_pot_manc_rd;
pub mod numeric;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::config::{ComputerConfig, CurriculumConfig};
use crate::dist::{validate_distribution, AnyDistConverter, DistConverter};
use crate::graph::TaskGraph;
use crate::history::ReturnHistories;
use crate::lp::{AnyLpEstimator, LpEstimator};

pub use lp::LpDistComputer;
pub use lp_pot::LpPotDistComputer;
pub use lp_pot_rr::LpPotRrDistComputer;
pub use mr::MrDistComputer;
pub use nlp_pot_manc_rd::NlpPotMancRdDistComputer;

// ---------------------------------------------------------------------------
// Attention phase
// ---------------------------------------------------------------------------

/// Per-task intermediate signals of the mastering-rate family.
///
/// `min_returns`/`max_returns` are the bounds the rates were normalized
/// against; `None` where a two-stage bound has not been committed yet.
#[derive(Debug, Clone, Serialize)]
pub struct MasteryReport {
    pub returns: Vec<f64>,
    pub min_returns: Vec<Option<f64>>,
    pub max_returns: Vec<Option<f64>>,
    pub na_lps: Option<Vec<f64>>,
    pub rates: Vec<f64>,
    pub pots: Vec<f64>,
    pub anc_rates: Option<Vec<f64>>,
    pub succ_rates: Option<Vec<f64>>,
    pub learning_states: Vec<f64>,
    pub pre_attentions: Vec<f64>,
}

/// Output of the attention phase.
#[derive(Debug, Clone)]
pub struct Attentions {
    /// One non-negative attention per task.
    pub attentions: Vec<f64>,
    pub mastery: Option<MasteryReport>,
}

/// The polymorphic second phase of a distribution update.
pub trait AttentionComputer: Send + Sync {
    /// Compute one attention per task from the (already ingested) histories
    /// and the learning progress estimated on them.
    fn compute_attentions(&mut self, histories: &ReturnHistories, lps: &[f64]) -> Result<Attentions>;

    fn num_tasks(&self) -> usize;

    /// Short label used in logs and reports.
    fn name(&self) -> &'static str;
}

/// Runtime-selectable attention variant.
#[derive(Debug, Clone)]
pub enum AnyAttentionComputer {
    Lp(LpDistComputer),
    Mr(MrDistComputer),
    LpPot(LpPotDistComputer),
    LpPotRr(LpPotRrDistComputer),
    NlpPotMancRd(NlpPotMancRdDistComputer),
}

impl AnyAttentionComputer {
    pub fn from_config(config: &ComputerConfig, graph: Arc<TaskGraph>) -> Result<Self> {
        let computer = match config {
            ComputerConfig::Lp => Self::Lp(LpDistComputer::new(graph.len())),
            ComputerConfig::Mr(p) => Self::Mr(MrDistComputer::new(graph, p)?),
            ComputerConfig::LpPot(p) => Self::LpPot(LpPotDistComputer::new(graph.len(), p)?),
            ComputerConfig::LpPotRr(p) => Self::LpPotRr(LpPotRrDistComputer::new(graph, p)?),
            ComputerConfig::NlpPotMancRd(p) => {
                Self::NlpPotMancRd(NlpPotMancRdDistComputer::new(graph, p)?)
            }
        };
        Ok(computer)
    }
}

impl AttentionComputer for AnyAttentionComputer {
    fn compute_attentions(&mut self, histories: &ReturnHistories, lps: &[f64]) -> Result<Attentions> {
        match self {
            Self::Lp(c) => c.compute_attentions(histories, lps),
            Self::Mr(c) => c.compute_attentions(histories, lps),
            Self::LpPot(c) => c.compute_attentions(histories, lps),
            Self::LpPotRr(c) => c.compute_attentions(histories, lps),
            Self::NlpPotMancRd(c) => c.compute_attentions(histories, lps),
        }
    }

    fn num_tasks(&self) -> usize {
        match self {
            Self::Lp(c) => c.num_tasks(),
            Self::Mr(c) => c.num_tasks(),
            Self::LpPot(c) => c.num_tasks(),
            Self::LpPotRr(c) => c.num_tasks(),
            Self::NlpPotMancRd(c) => c.num_tasks(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Lp(c) => c.name(),
            Self::Mr(c) => c.name(),
            Self::LpPot(c) => c.name(),
            Self::LpPotRr(c) => c.name(),
            Self::NlpPotMancRd(c) => c.name(),
        }
    }
}

// ---------------------------------------------------------------------------
// Two-phase driver
// ---------------------------------------------------------------------------

/// Everything one update produced, for logging and inspection.
#[derive(Debug, Clone, Serialize)]
pub struct CurriculumUpdate {
    /// Round counter after the ingest step (first update is round 1).
    pub round: usize,
    pub computer: &'static str,
    /// The aggregated returns that were ingested.
    pub returns: BTreeMap<usize, f64>,
    pub lps: Vec<f64>,
    pub a_lps: Vec<f64>,
    pub attentions: Vec<f64>,
    pub dist: Vec<f64>,
    pub mastery: Option<MasteryReport>,
}

/// Owns the return histories and runs ingest + attention + conversion.
pub struct DistComputer {
    histories: ReturnHistories,
    round: usize,
    attention: AnyAttentionComputer,
    estimator: Box<dyn LpEstimator>,
    converter: Box<dyn DistConverter>,
}

impl DistComputer {
    pub fn new(
        attention: AnyAttentionComputer,
        estimator: Box<dyn LpEstimator>,
        converter: Box<dyn DistConverter>,
    ) -> Self {
        Self {
            histories: ReturnHistories::new(attention.num_tasks()),
            round: 0,
            attention,
            estimator,
            converter,
        }
    }

    /// Build the computer, estimator and converter named in `config`.
    pub fn from_config(config: &CurriculumConfig, graph: Arc<TaskGraph>) -> Result<Self> {
        let attention = AnyAttentionComputer::from_config(&config.computer, graph)
            .context("invalid computer configuration")?;
        let estimator =
            AnyLpEstimator::from_config(&config.lp).context("invalid lp configuration")?;
        let converter =
            AnyDistConverter::from_config(&config.dist).context("invalid dist configuration")?;
        Ok(Self::new(attention, Box::new(estimator), Box::new(converter)))
    }

    /// Phase 1: advance the round and record `returns` in the histories.
    ///
    /// The whole mapping is validated before anything is mutated. An empty
    /// mapping only advances the round.
    pub fn ingest(&mut self, returns: &BTreeMap<usize, f64>) -> Result<()> {
        let n = self.histories.num_tasks();
        for (&task, &value) in returns {
            ensure!(task < n, "return reported for unknown task {task} (have {n} tasks)");
            ensure!(value.is_finite(), "return for task {task} is not finite: {value}");
        }

        self.round += 1;
        for (&task, &value) in returns {
            self.histories.append(task, self.round, value)?;
        }
        Ok(())
    }

    /// Ingest `returns`, then compute and convert attentions.
    ///
    /// The update is all-or-nothing: it runs on a staged copy that replaces
    /// `self` only on success, so after an error the round, histories,
    /// bounds and estimator state are exactly as before and the same
    /// returns can be submitted again.
    pub fn update(&mut self, returns: &BTreeMap<usize, f64>) -> Result<CurriculumUpdate> {
        let mut staged = self.clone();
        let update = staged.apply(returns)?;
        *self = staged;
        Ok(update)
    }

    fn apply(&mut self, returns: &BTreeMap<usize, f64>) -> Result<CurriculumUpdate> {
        self.ingest(returns)?;

        let n = self.histories.num_tasks();
        let lps = self
            .estimator
            .estimate(&self.histories)
            .with_context(|| format!("{} estimator failed", self.estimator.name()))?;
        ensure!(
            lps.len() == n,
            "learning-progress estimator returned {} values for {n} tasks",
            lps.len()
        );

        let Attentions {
            attentions,
            mastery,
        } = self.attention.compute_attentions(&self.histories, &lps)?;

        let dist = self
            .converter
            .convert(&attentions)
            .with_context(|| format!("{} converter failed", self.converter.name()))?;
        validate_distribution(&dist, n)?;

        debug!(
            round = self.round,
            computer = self.attention.name(),
            dist = ?dist,
            "distribution updated"
        );

        Ok(CurriculumUpdate {
            round: self.round,
            computer: self.attention.name(),
            returns: returns.clone(),
            a_lps: lps.iter().map(|v| v.abs()).collect(),
            lps,
            attentions,
            dist,
            mastery,
        })
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn histories(&self) -> &ReturnHistories {
        &self.histories
    }

    pub fn num_tasks(&self) -> usize {
        self.histories.num_tasks()
    }

    pub fn name(&self) -> &'static str {
        self.attention.name()
    }
}

impl Clone for DistComputer {
    fn clone(&self) -> Self {
        Self {
            histories: self.histories.clone(),
            round: self.round,
            attention: self.attention.clone(),
            estimator: self.estimator.boxed_clone(),
            converter: self.converter.boxed_clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared parameter checks
// ---------------------------------------------------------------------------

pub(crate) fn check_windows(ret_k: usize, ext_ret_k: usize) -> Result<()> {
    ensure!(ext_ret_k > 0, "ext_ret_k must be at least 1");
    ensure!(
        ret_k >= ext_ret_k,
        "ret_k ({ret_k}) must be at least ext_ret_k ({ext_ret_k})"
    );
    Ok(())
}

pub(crate) fn check_unit(name: &str, value: f64) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&value),
        "{name} must lie in [0, 1], got {value}"
    );
    Ok(())
}

pub(crate) fn check_init_bounds(num_tasks: usize, min: &[f64], max: &[f64]) -> Result<()> {
    ensure!(
        min.len() == num_tasks && max.len() == num_tasks,
        "initial bounds must have one entry per task ({num_tasks}), got {} and {}",
        min.len(),
        max.len()
    );
    for (task, (lo, hi)) in min.iter().zip(max).enumerate() {
        ensure!(
            lo.is_finite() && hi.is_finite() && lo <= hi,
            "initial bounds for task {task} are invalid: [{lo}, {hi}]"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LpPotRrParams, MrParams};
    use crate::dist::GreedyPropDist;

    /// Returns a fixed learning-progress vector, whatever the histories.
    #[derive(Clone)]
    struct FixedLp(Vec<f64>);

    impl LpEstimator for FixedLp {
        fn estimate(&mut self, _histories: &ReturnHistories) -> Result<Vec<f64>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }

        fn boxed_clone(&self) -> Box<dyn LpEstimator> {
            Box::new(self.clone())
        }
    }

    #[derive(Clone)]
    struct FailingLp;

    impl LpEstimator for FailingLp {
        fn estimate(&mut self, _histories: &ReturnHistories) -> Result<Vec<f64>> {
            anyhow::bail!("estimator exploded")
        }

        fn name(&self) -> &'static str {
            "failing"
        }

        fn boxed_clone(&self) -> Box<dyn LpEstimator> {
            Box::new(self.clone())
        }
    }

    fn mr_computer(n: usize, lp: Vec<f64>) -> DistComputer {
        let graph = Arc::new(TaskGraph::chain(n).unwrap());
        let params = MrParams {
            init_min_returns: vec![0.0; n],
            init_max_returns: vec![1.0; n],
            ret_k: 2,
            ext_ret_k: 1,
            power: 1.0,
            pot_prop: 0.5,
            pred_tr: 0.3,
        };
        DistComputer::new(
            AnyAttentionComputer::Mr(MrDistComputer::new(graph, &params).unwrap()),
            Box::new(FixedLp(lp)),
            Box::new(GreedyPropDist::new(0.0).unwrap()),
        )
    }

    fn returns(pairs: &[(usize, f64)]) -> BTreeMap<usize, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn ingest_appends_with_round_index() {
        let mut c = mr_computer(3, vec![0.0; 3]);
        c.ingest(&returns(&[(0, 0.5), (2, 1.0)])).unwrap();
        c.ingest(&returns(&[(0, 0.7)])).unwrap();
        assert_eq!(c.round(), 2);
        assert_eq!(c.histories()[0].last(5), (&[1, 2][..], &[0.5, 0.7][..]));
        assert_eq!(c.histories()[2].last(5), (&[1][..], &[1.0][..]));
        assert!(c.histories()[1].is_empty());
    }

    #[test]
    fn empty_ingest_only_advances_the_round() {
        let mut c = mr_computer(2, vec![0.0; 2]);
        c.update(&returns(&[(0, 0.6)])).unwrap();
        let before: Vec<usize> = c.histories().iter().map(|h| h.len()).collect();

        c.ingest(&BTreeMap::new()).unwrap();
        assert_eq!(c.round(), 2);
        let after: Vec<usize> = c.histories().iter().map(|h| h.len()).collect();
        assert_eq!(before, after);

        // Representative returns and bounds are untouched as well.
        let AnyAttentionComputer::Mr(mr) = &c.attention else {
            panic!("expected mr");
        };
        assert_eq!(mr.returns(), &[0.6, 0.0]);
        assert_eq!(mr.max_returns(), &[1.0, 1.0]);
    }

    #[test]
    fn ingest_rejects_unknown_task_without_mutating() {
        let mut c = mr_computer(2, vec![0.0; 2]);
        let err = c.ingest(&returns(&[(0, 1.0), (5, 1.0)])).unwrap_err();
        assert!(err.to_string().contains("unknown task 5"));
        assert_eq!(c.round(), 0);
        assert!(c.histories()[0].is_empty());
        assert!(c.ingest(&returns(&[(0, f64::NAN)])).is_err());
    }

    #[test]
    fn update_produces_a_distribution() {
        let mut c = mr_computer(3, vec![0.1, -0.4, 0.2]);
        let update = c.update(&returns(&[(0, 0.2)])).unwrap();
        assert_eq!(update.round, 1);
        assert_eq!(update.computer, "mr");
        assert_eq!(update.a_lps, vec![0.1, 0.4, 0.2]);
        let total: f64 = update.dist.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(update.dist.iter().all(|&p| p >= 0.0));
        assert!(update.mastery.is_some());
    }

    #[test]
    fn estimator_length_mismatch_is_an_error() {
        let mut c = mr_computer(3, vec![0.1]);
        assert!(c.update(&BTreeMap::new()).is_err());
    }

    #[test]
    fn estimator_failures_propagate() {
        let graph = Arc::new(TaskGraph::chain(2).unwrap());
        let mut c = DistComputer::new(
            AnyAttentionComputer::Lp(LpDistComputer::new(graph.len())),
            Box::new(FailingLp),
            Box::new(GreedyPropDist::new(0.1).unwrap()),
        );
        let err = c.update(&BTreeMap::new()).unwrap_err();
        assert!(format!("{err:#}").contains("estimator exploded"));
    }

    #[test]
    fn failed_update_leaves_no_trace() {
        let graph = Arc::new(TaskGraph::chain(2).unwrap());
        let mut c = DistComputer::new(
            AnyAttentionComputer::Lp(LpDistComputer::new(graph.len())),
            Box::new(FailingLp),
            Box::new(GreedyPropDist::new(0.1).unwrap()),
        );
        let batch = returns(&[(0, 1.0)]);
        for _ in 0..3 {
            assert!(c.update(&batch).is_err());
        }
        assert_eq!(c.round(), 0);
        assert!(c.histories()[0].is_empty());

        // A mismatched estimator fails after the ingest step; still nothing sticks.
        let mut c = mr_computer(2, vec![0.1]);
        assert!(c.update(&batch).is_err());
        assert_eq!(c.round(), 0);
        assert!(c.histories()[0].is_empty());
        let AnyAttentionComputer::Mr(mr) = &c.attention else {
            panic!("expected mr");
        };
        assert_eq!(mr.returns(), &[0.0, 0.0]);
    }

    #[test]
    fn from_config_rejects_bad_windows() {
        let mut config = CurriculumConfig::default();
        config.graph.num_tasks = 2;
        config.graph.edges = vec![(0, 1)];
        config.computer = ComputerConfig::LpPotRr(LpPotRrParams {
            ret_k: 1,
            ext_ret_k: 3,
            pot_coef: 1.0,
            init_min_returns: None,
            init_max_returns: None,
        });
        let graph = Arc::new(TaskGraph::chain(2).unwrap());
        assert!(DistComputer::from_config(&config, graph).is_err());
    }

    #[test]
    fn every_variant_builds_and_updates() {
        let graph = Arc::new(TaskGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]).unwrap());
        let n = graph.len();
        let configs = vec![
            ComputerConfig::Lp,
            ComputerConfig::Mr(MrParams {
                init_min_returns: vec![0.0; n],
                init_max_returns: vec![1.0; n],
                ret_k: 3,
                ext_ret_k: 2,
                power: 6.0,
                pot_prop: 0.5,
                pred_tr: 0.2,
            }),
            ComputerConfig::LpPot(crate::config::LpPotParams {
                init_min_returns: vec![0.0; n],
                init_max_returns: vec![1.0; n],
                pot_coef: 1.0,
            }),
            ComputerConfig::LpPotRr(LpPotRrParams {
                ret_k: 3,
                ext_ret_k: 2,
                pot_coef: 1.0,
                init_min_returns: None,
                init_max_returns: None,
            }),
            ComputerConfig::NlpPotMancRd(crate::config::NlpPotMancRdParams {
                ret_k: 3,
                ext_ret_k: 2,
                power: 6.0,
                pot_prop: 0.5,
                tr: 0.3,
                init_min_returns: None,
                init_max_returns: None,
            }),
        ];

        for computer in configs {
            let mut config = CurriculumConfig::default();
            config.computer = computer;
            let mut c = DistComputer::from_config(&config, graph.clone()).unwrap();
            for round in 0..6 {
                let value = round as f64 / 5.0;
                let update = c
                    .update(&returns(&[(0, value), (round % n, 0.5 * value)]))
                    .unwrap();
                assert!(update.attentions.iter().all(|a| a.is_finite() && *a >= 0.0));
                let total: f64 = update.dist.iter().sum();
                assert!((total - 1.0).abs() < 1e-9, "{}: {:?}", c.name(), update.dist);
            }
        }
    }
}
