//! Per-task return histories.
//!
//! Every distribution update appends at most one `(round, return)` pair per
//! task. Histories only grow; consumers read a trailing window with
//! [`ReturnHistory::last`].

pub mod return_history;

pub use return_history::{mean, ReturnHistories, ReturnHistory};
