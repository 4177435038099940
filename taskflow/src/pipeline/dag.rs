//! Sequential pipeline execution.
//!
//! Tasks run strictly in append order against a run-scoped
//! [`ExecutionContext`]; the first terminal failure stops the run.

use super::builder::validate_append;
use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::core::TaskState;
use crate::errors::{PipelineError, PipelineValidationError, TaskFailure};
use crate::events::{event_types, EventSink, LoggingEventSink};
use crate::tasks::{Task, TaskRuntime, TaskStateTracker};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// Result of a pipeline run.
#[derive(Debug)]
pub struct PipelineRunResult {
    /// The pipeline name.
    pub pipeline: String,
    /// Entries written during the run.
    pub context: ExecutionContext,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
    /// The terminal failure that stopped the run, if any.
    pub failure: Option<TaskFailure>,
    /// Tasks never invoked because an earlier task failed.
    pub skipped: Vec<String>,
}

impl PipelineRunResult {
    /// Whether every task succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.context.run_id()
    }

    /// The name of the task that stopped the run.
    #[must_use]
    pub fn failed_task(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.task.as_str())
    }

    /// Converts into the final context, or the error that stopped the run.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` carrying the failure and the partial context.
    pub fn into_result(self) -> Result<ExecutionContext, PipelineError> {
        match self.failure {
            None => Ok(self.context),
            Some(failure) => Err(PipelineError {
                pipeline: self.pipeline,
                failure,
                context: self.context,
            }),
        }
    }
}

/// An ordered sequence of tasks sharing one context per run.
pub struct Pipeline {
    name: String,
    tasks: Vec<Task>,
    sink: Arc<dyn EventSink>,
    tracker: TaskStateTracker,
    pub(super) deadline: Option<Duration>,
}

impl Pipeline {
    /// Creates an empty pipeline that logs through `tracing`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            sink: Arc::new(LoggingEventSink::default()),
            tracker: TaskStateTracker::new(),
            deadline: None,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Bounds every run by `budget` of wall time.
    #[must_use]
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(budget);
        self
    }

    /// Appends a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, reserved or taken, or if a
    /// declared dependency was not appended earlier. The pipeline is left
    /// unchanged on error.
    pub fn add_task(&mut self, task: Task) -> Result<(), PipelineValidationError> {
        validate_append(&self.task_names(), &task)?;
        self.tasks.push(task);
        Ok(())
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tasks in execution order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns the task names in execution order.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(Task::name).collect()
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Returns the run deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Returns a handle for observing task states while a run is in flight.
    #[must_use]
    pub fn tracker(&self) -> TaskStateTracker {
        self.tracker.clone()
    }

    /// Runs every task in order.
    pub async fn run(&self) -> PipelineRunResult {
        self.run_with_cancellation(Arc::new(CancellationToken::new())).await
    }

    /// Runs every task in order, stopping early if `cancel` fires.
    ///
    /// Cancellation is observed between attempts and during retry waits and
    /// surfaces as a terminal failure of the task being run.
    pub async fn run_with_cancellation(&self, cancel: Arc<CancellationToken>) -> PipelineRunResult {
        let ctx = ExecutionContext::new();
        let span = info_span!(
            "pipeline.run",
            pipeline = %self.name,
            run_id = %ctx.run_id(),
        );
        self.execute(ctx, cancel).instrument(span).await
    }

    async fn execute(&self, mut ctx: ExecutionContext, cancel: Arc<CancellationToken>) -> PipelineRunResult {
        let started = Instant::now();
        let run_id = ctx.run_id();

        let mut rt = TaskRuntime::new(self.sink.clone())
            .with_cancellation(cancel)
            .with_tracker(self.tracker.clone());
        if let Some(budget) = self.deadline {
            rt = rt.with_deadline(budget);
        }

        self.tracker.reset(self.tasks.iter().map(Task::name));
        self.sink.try_emit(
            event_types::PIPELINE_STARTED,
            Some(json!({
                "pipeline": &self.name,
                "run_id": run_id.to_string(),
                "task_count": self.tasks.len(),
            })),
        );

        let mut failure = None;
        let mut skipped = Vec::new();

        for (index, task) in self.tasks.iter().enumerate() {
            let outcome = match task.run(&ctx, &rt).await {
                Ok(success) => ctx
                    .insert(task.name(), success.value)
                    .map_err(|conflict| TaskFailure::new(task.name(), success.attempts, conflict.into())),
                Err(task_failure) => Err(task_failure),
            };

            if let Err(task_failure) = outcome {
                for rest in &self.tasks[index + 1..] {
                    self.tracker.transition(rest.name(), TaskState::Skipped);
                    skipped.push(rest.name().to_string());
                }
                failure = Some(task_failure);
                break;
            }
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.sink.try_emit(
            event_types::PIPELINE_COMPLETED,
            Some(json!({
                "pipeline": &self.name,
                "run_id": run_id.to_string(),
                "success": failure.is_none(),
                "duration_ms": duration_ms,
                "failed_task": failure.as_ref().map(|f: &TaskFailure| f.task.clone()),
                "error": failure.as_ref().map(|f: &TaskFailure| f.cause.to_string()),
                "skipped": &skipped,
            })),
        );

        PipelineRunResult {
            pipeline: self.name.clone(),
            context: ctx,
            duration_ms,
            failure,
            skipped,
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("tasks", &self.task_names())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_empty_pipeline_succeeds() {
        let result = Pipeline::new("empty").run().await;
        assert!(result.success());
        assert_eq!(result.context.task_entry_count(), 0);
        assert!(result.context.contains_key("start_time"));
    }

    #[tokio::test]
    async fn test_lifecycle_events_bracket_the_run() {
        let sink = Arc::new(CollectingEventSink::new());
        let mut pipeline = Pipeline::new("p").with_event_sink(sink.clone());
        pipeline.add_task(Task::new("a", |_| Ok(json!(1)), 0)).unwrap();

        let result = pipeline.run().await;

        let types = sink.event_types();
        assert_eq!(types.first().map(String::as_str), Some(event_types::PIPELINE_STARTED));
        assert_eq!(types.last().map(String::as_str), Some(event_types::PIPELINE_COMPLETED));

        let (_, completed) = sink.events_of_type(event_types::PIPELINE_COMPLETED).remove(0);
        let completed = completed.unwrap();
        assert_eq!(completed["success"], json!(true));
        assert_eq!(completed["run_id"], json!(result.run_id().to_string()));
        assert_eq!(completed["failed_task"], json!(null));
    }

    #[tokio::test]
    async fn test_failure_marks_rest_skipped() {
        let sink = Arc::new(CollectingEventSink::new());
        let mut pipeline = Pipeline::new("p").with_event_sink(sink.clone());
        pipeline.add_task(Task::new("a", |_| Ok(json!(1)), 0)).unwrap();
        pipeline.add_task(Task::new("b", |_| Err(anyhow::anyhow!("broken")), 0)).unwrap();
        pipeline.add_task(Task::new("c", |_| Ok(json!(3)), 0)).unwrap();

        let result = pipeline.run().await;

        assert!(!result.success());
        assert_eq!(result.failed_task(), Some("b"));
        assert_eq!(result.skipped, vec!["c".to_string()]);
        assert_eq!(pipeline.tracker().state("c"), Some(TaskState::Skipped));
        assert_eq!(pipeline.tracker().state("b"), Some(TaskState::Failed { attempts: 1 }));

        let (_, completed) = sink.events_of_type(event_types::PIPELINE_COMPLETED).remove(0);
        let completed = completed.unwrap();
        assert_eq!(completed["failed_task"], json!("b"));
        assert_eq!(completed["error"], json!("broken"));
        assert_eq!(completed["skipped"], json!(["c"]));
    }

    #[tokio::test]
    async fn test_into_result_forwards_cause() {
        let mut pipeline = Pipeline::new("p").with_event_sink(Arc::new(CollectingEventSink::new()));
        pipeline.add_task(Task::new("a", |_| Ok(json!("kept")), 0)).unwrap();
        pipeline
            .add_task(Task::new("b", |_| Err(anyhow::anyhow!("disk full")), 0))
            .unwrap();

        let err = pipeline.run().await.into_result().unwrap_err();

        assert_eq!(err.pipeline, "p");
        assert_eq!(err.failed_task(), "b");
        assert_eq!(err.failure.cause.to_string(), "disk full");
        assert_eq!(err.context.get("a"), Some(&json!("kept")));
        assert!(err.to_string().contains("task 'b' failed after 1 attempt(s)"));
    }

    #[test]
    fn test_debug_lists_tasks() {
        let mut pipeline = Pipeline::new("p");
        pipeline.add_task(Task::new("only", |_| Ok(json!(1)), 0)).unwrap();
        assert!(format!("{pipeline:?}").contains("only"));
    }
}
