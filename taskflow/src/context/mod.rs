//! Context management for pipeline execution.
//!
//! Every run gets its own [`ExecutionContext`]; tasks read upstream results
//! from it by the producing task's name.

mod execution;

pub use execution::{ExecutionContext, START_TIME_KEY};
