//! Agent module: the simulated learner driven through the curriculum.
//!
//! The [`SimulatedLearner`] stands in for a real policy. Its competence on a
//! task only grows when the task's prerequisites are already learned, which
//! gives the curriculum something to discover.

pub mod learner;

pub use learner::{LearnerSnapshot, SimulatedLearner};
