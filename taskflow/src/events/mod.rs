//! Lifecycle events for observability.
//!
//! The runner reports progress through an [`EventSink`]. Where events end up
//! (logs, a collector, nowhere) is up to the caller.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the runner.
pub mod event_types {
    /// A pipeline or routing graph run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A task attempt began.
    pub const TASK_STARTED: &str = "task.started";
    /// A task attempt returned an error.
    pub const TASK_ATTEMPT_FAILED: &str = "task.attempt_failed";
    /// A task is waiting before its next attempt.
    pub const TASK_RETRYING: &str = "task.retrying";
    /// A task produced a result.
    pub const TASK_SUCCEEDED: &str = "task.succeeded";
    /// A task failed terminally.
    pub const TASK_FAILED: &str = "task.failed";
    /// A routing graph router picked the next node.
    pub const ROUTE_SELECTED: &str = "route.selected";
    /// A run finished, successfully or not.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
}
