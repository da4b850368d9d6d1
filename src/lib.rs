//! menv: graph-aware curriculum learning over a set of task environments.
//!
//! A [`MultiEnv`](env::MultiEnv) samples one task per episode from a
//! distribution. Per-task episode returns are fed to a
//! [`DistComputer`](computer::DistComputer), which estimates learning
//! progress and mastery, turns them into attentions over the prerequisite
//! graph and converts those into the next distribution.

pub mod agent;
pub mod computer;
pub mod config;
pub mod dist;
pub mod env;
pub mod graph;
pub mod history;
pub mod lp;
pub mod training;
