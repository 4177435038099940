//! Error types for the taskflow runner.
//!
//! Configuration problems are reported when a pipeline is assembled; failures
//! of units of work are reported through [`TaskFailure`] once a task's retry
//! budget is spent.

use crate::context::ExecutionContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The main error type for taskflow operations.
#[derive(Debug, Error)]
pub enum TaskflowError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A pipeline run failed.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// A configuration value could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-001-DUPLICATE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline or routing graph is misconfigured.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The tasks involved in the error.
    pub tasks: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tasks: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the tasks involved.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    pub(crate) fn empty_name() -> Self {
        Self::new("Task name must not be empty").with_error_info(
            ContractErrorInfo::new("CONTRACT-001-EMPTY_NAME", "Task name is empty")
                .with_fix_hint("Give every task a non-empty name; it is used as its context key."),
        )
    }

    pub(crate) fn reserved_name(name: &str) -> Self {
        Self::new(format!("Task name '{name}' is reserved by the execution context"))
            .with_tasks(vec![name.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-002-RESERVED_NAME",
                    format!("'{name}' collides with a reserved context key"),
                )
                .with_fix_hint("Rename the task."),
            )
    }

    pub(crate) fn duplicate_name(name: &str) -> Self {
        Self::new(format!("Duplicate task name '{name}'"))
            .with_tasks(vec![name.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-003-DUPLICATE",
                    format!("Task '{name}' is already registered"),
                )
                .with_fix_hint("Task names are context keys and must be unique within a pipeline."),
            )
    }

    pub(crate) fn unknown_dependency(task: &str, dependency: &str) -> Self {
        Self::new(format!(
            "Task '{task}' depends on '{dependency}', which is not appended before it"
        ))
        .with_tasks(vec![task.to_string(), dependency.to_string()])
        .with_error_info(
            ContractErrorInfo::new(
                "CONTRACT-004-MISSING_DEP",
                format!("Dependency '{dependency}' not found upstream"),
            )
            .with_context_entry("task", task)
            .with_fix_hint("Append the dependency before the task that depends on it."),
        )
    }

    pub(crate) fn unknown_node(name: &str) -> Self {
        Self::new(format!("Routing graph has no node named '{name}'"))
            .with_tasks(vec![name.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-005-UNKNOWN_NODE",
                    format!("Node '{name}' is not registered"),
                )
                .with_fix_hint("Add the node before wiring edges to or from it."),
            )
    }

    pub(crate) fn edge_exists(from: &str) -> Self {
        Self::new(format!("Node '{from}' already has an outgoing edge"))
            .with_tasks(vec![from.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-006-EDGE_EXISTS",
                    format!("Node '{from}' has more than one outgoing edge"),
                )
                .with_fix_hint("Use a conditional edge to choose between several successors."),
            )
    }

    pub(crate) fn missing_entry() -> Self {
        Self::new("Routing graph has no entry node").with_error_info(
            ContractErrorInfo::new("CONTRACT-007-NO_ENTRY", "No entry node set")
                .with_fix_hint("Call entry() with the first node to run."),
        )
    }
}

/// Error raised when writing to an existing key in the execution context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Data conflict: key '{key}' already exists")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised when a unit of work requires a context entry that was never
/// written.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Missing context entry '{key}'")]
pub struct MissingEntryError {
    /// The missing key.
    pub key: String,
}

impl MissingEntryError {
    /// Creates a new missing entry error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Why a task stopped without producing a result.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// The last attempt's error once the retry budget was spent.
    #[error(transparent)]
    Work(anyhow::Error),

    /// The run was cancelled at an attempt boundary or during a retry wait.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// The pipeline deadline passed before the task could succeed.
    #[error("pipeline deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// The task's result could not be recorded in the context.
    #[error(transparent)]
    Conflict(#[from] DataConflictError),
}

/// Terminal failure of a single task.
#[derive(Debug, Error)]
#[error("task '{task}' failed after {attempts} attempt(s): {cause}")]
pub struct TaskFailure {
    /// The failing task's name.
    pub task: String,
    /// Number of attempts actually made.
    pub attempts: usize,
    /// The underlying cause.
    #[source]
    pub cause: FailureCause,
}

impl TaskFailure {
    /// Creates a new task failure.
    #[must_use]
    pub fn new(task: impl Into<String>, attempts: usize, cause: FailureCause) -> Self {
        Self {
            task: task.into(),
            attempts,
            cause,
        }
    }

    /// Returns true if the failure was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, FailureCause::Cancelled { .. })
    }

    /// Returns true if the failure was caused by the pipeline deadline.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self.cause, FailureCause::DeadlineExceeded(_))
    }
}

/// A failed pipeline run, carrying the failing task and the partial context.
#[derive(Debug, Error)]
#[error("pipeline '{pipeline}' failed: {failure}")]
pub struct PipelineError {
    /// The pipeline name.
    pub pipeline: String,
    /// The task failure that stopped the run.
    #[source]
    pub failure: TaskFailure,
    /// Entries written before the failure.
    pub context: ExecutionContext,
}

impl PipelineError {
    /// Returns the name of the task that stopped the run.
    #[must_use]
    pub fn failed_task(&self) -> &str {
        &self.failure.task
    }
}

/// Errors specific to routing graph execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// A router chose a node that is not among its declared targets.
    #[error("Router on '{from}' selected undeclared target '{target}'")]
    UndeclaredRoute {
        /// The node whose router made the choice.
        from: String,
        /// The selected target.
        target: String,
    },

    /// The graph visited more nodes than allowed.
    #[error("Routing graph exceeded {limit} steps")]
    StepLimitExceeded {
        /// The configured step limit.
        limit: usize,
    },
}
