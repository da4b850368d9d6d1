//! Prerequisite graph over curriculum tasks.
//!
//! Tasks are the nodes `0..N-1` of a directed acyclic graph. An edge `a -> b`
//! states that task `a` is a prerequisite of task `b`: mastering `a` is what
//! makes `b` learnable.

pub mod task_graph;

pub use task_graph::{GraphSummary, TaskGraph};
