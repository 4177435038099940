//! Core types shared across the runner.

mod status;

pub use status::TaskState;
