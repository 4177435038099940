//! Test assertions for run results and collected events.

use crate::context::ExecutionContext;
use crate::events::CollectingEventSink;
use crate::pipeline::PipelineRunResult;

/// Asserts that every task in the run succeeded.
pub fn assert_run_succeeded(result: &PipelineRunResult) {
    assert!(
        result.success(),
        "Expected pipeline '{}' to succeed, but it failed: {:?}",
        result.pipeline,
        result.failure.as_ref().map(ToString::to_string)
    );
}

/// Asserts that the run stopped at `task`.
pub fn assert_run_failed_at(result: &PipelineRunResult, task: &str) {
    assert_eq!(
        result.failed_task(),
        Some(task),
        "Expected pipeline '{}' to fail at '{}'",
        result.pipeline,
        task
    );
}

/// Asserts that the context holds exactly `keys` as task entries, in order.
///
/// The reserved start-time entry is ignored.
pub fn assert_context_keys(ctx: &ExecutionContext, keys: &[&str]) {
    let actual: Vec<&str> = ctx.keys().filter(|k| *k != crate::context::START_TIME_KEY).collect();
    assert_eq!(actual, keys, "Unexpected context entries");
}

/// Asserts how many events of `event_type` were collected.
pub fn assert_event_count(sink: &CollectingEventSink, event_type: &str, expected: usize) {
    let actual = sink.count(event_type);
    assert_eq!(
        actual, expected,
        "Expected {expected} '{event_type}' event(s), got {actual}. Events: {:?}",
        sink.event_types()
    );
}
