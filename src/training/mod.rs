//! Training module: the simulated curriculum loop and its reports.
//!
//! [`TrainingPipeline`] drives a [`MultiEnv`](crate::env::MultiEnv) with a
//! [`SimulatedLearner`](crate::agent::SimulatedLearner) and records one
//! [`RoundMetrics`] per distribution update into a [`RunReport`].

pub mod pipeline;
pub mod report;

pub use pipeline::{run_episode, TrainingPipeline};
pub use report::{RoundMetrics, RunReport};
