//! # Taskflow
//!
//! A sequential task pipeline runner.
//!
//! Taskflow runs an ordered list of named units of work with:
//!
//! - **Bounded retries**: each task gets `max_retries + 1` attempts with a
//!   fixed delay by default, or linear/exponential backoff with jitter
//! - **A run-scoped context**: every task's result is stored under its name
//!   and visible to the tasks after it
//! - **Short-circuiting**: the first terminal failure stops the run and is
//!   handed back to the caller with the partial context
//! - **Lifecycle events**: every attempt, failure and completion is emitted
//!   to an [`events::EventSink`], logged through `tracing` by default
//! - **Cancellation and deadlines**: honored between attempts and during
//!   retry waits, never mid-attempt
//! - **Routing graphs**: nodes whose successors are chosen from the context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use taskflow::prelude::*;
//! use serde_json::json;
//!
//! let pipeline = PipelineBuilder::new("ingest")
//!     .task(Task::new("extract", |_| Ok(json!([1, 2, 3])), 3))?
//!     .task(Task::new("count", |ctx| {
//!         let rows: Vec<i64> = ctx.require_as("extract")?;
//!         Ok(json!(rows.len()))
//!     }, 3).depends_on("extract"))?
//!     .build();
//!
//! let ctx = pipeline.run().await.into_result()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod etl;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod tasks;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{LogFormat, PipelineConfig};
    pub use crate::context::ExecutionContext;
    pub use crate::core::TaskState;
    pub use crate::errors::{
        ContractErrorInfo, DataConflictError, FailureCause, MissingEntryError, PipelineError,
        PipelineValidationError, RoutingError, TaskFailure, TaskflowError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        BackoffStrategy, JitterStrategy, Pipeline, PipelineBuilder, PipelineRunResult, RetryPolicy,
        Route, RoutingGraph, RoutingRunResult,
    };
    pub use crate::tasks::{Task, TaskStateTracker, Work, WorkResult};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
