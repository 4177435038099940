//! Testing utilities for taskflow pipelines.
//!
//! This module provides:
//! - Scripted units of work that fail a set number of times
//! - Assertions over run results and collected events

mod assertions;
mod mocks;

pub use assertions::{
    assert_context_keys, assert_event_count, assert_run_failed_at, assert_run_succeeded,
};
pub use mocks::{ScriptedWork, SlowWork};
