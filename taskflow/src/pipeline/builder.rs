//! Pipeline builder with validation.

use super::Pipeline;
use crate::config::PipelineConfig;
use crate::context::{ExecutionContext, START_TIME_KEY};
use crate::errors::PipelineValidationError;
use crate::events::EventSink;
use crate::pipeline::RetryPolicy;
use crate::tasks::{Task, WorkResult};
use std::sync::Arc;
use std::time::Duration;

/// Checks a task against the tasks already appended before it.
///
/// Names must be non-empty, unique and not reserved. Declared dependencies
/// must name a task appended earlier; nothing is reordered.
pub(crate) fn validate_append(existing: &[&str], task: &Task) -> Result<(), PipelineValidationError> {
    let name = task.name();
    if name.trim().is_empty() {
        return Err(PipelineValidationError::empty_name());
    }
    if name == START_TIME_KEY {
        return Err(PipelineValidationError::reserved_name(name));
    }
    if existing.contains(&name) {
        return Err(PipelineValidationError::duplicate_name(name));
    }

    for dep in task.dependencies() {
        if !existing.contains(&dep.as_str()) {
            return Err(PipelineValidationError::unknown_dependency(name, dep));
        }
    }

    Ok(())
}

/// Builder for creating validated pipelines.
///
/// Tasks added through [`PipelineBuilder::work`] inherit the retry policy and
/// attempt timeout of the configuration passed to
/// [`PipelineBuilder::config`]; tasks added through
/// [`PipelineBuilder::task`] keep their own.
#[derive(Debug)]
pub struct PipelineBuilder {
    pipeline: Pipeline,
    retry: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            pipeline: Pipeline::new(name),
            retry: RetryPolicy::default(),
            attempt_timeout: None,
        }
    }

    /// Applies task defaults and the run deadline from a configuration.
    #[must_use]
    pub fn config(mut self, config: &PipelineConfig) -> Self {
        self.retry = config.retry_policy();
        self.attempt_timeout = config.attempt_timeout();
        self.pipeline.deadline = config.deadline();
        self
    }

    /// Appends a fully configured task.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, reserved or taken, or if a
    /// declared dependency was not appended earlier.
    pub fn task(mut self, task: Task) -> Result<Self, PipelineValidationError> {
        self.pipeline.add_task(task)?;
        Ok(self)
    }

    /// Appends a task from a closure using the configured defaults.
    ///
    /// # Errors
    ///
    /// Same as [`PipelineBuilder::task`].
    pub fn work<F>(self, name: impl Into<String>, work: F) -> Result<Self, PipelineValidationError>
    where
        F: Fn(&ExecutionContext) -> WorkResult + Send + Sync + 'static,
    {
        let mut task = Task::new(name, work, self.retry.max_retries).with_retry_policy(self.retry.clone());
        if let Some(limit) = self.attempt_timeout {
            task = task.with_attempt_timeout(limit);
        }
        self.task(task)
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.pipeline = self.pipeline.with_event_sink(sink);
        self
    }

    /// Sets the run deadline.
    #[must_use]
    pub fn deadline(mut self, budget: Duration) -> Self {
        self.pipeline = self.pipeline.with_deadline(budget);
        self
    }

    /// Returns the number of tasks appended so far.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.pipeline.task_count()
    }

    /// Builds the pipeline.
    ///
    /// An empty pipeline is valid; running it succeeds immediately.
    #[must_use]
    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BackoffStrategy;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ok_task(name: &str) -> Task {
        Task::new(name, |_| Ok(json!(null)), 0)
    }

    #[test]
    fn test_builder_appends_in_order() {
        let pipeline = PipelineBuilder::new("p")
            .task(ok_task("a"))
            .unwrap()
            .task(ok_task("b").depends_on("a"))
            .unwrap()
            .build();

        assert_eq!(pipeline.name(), "p");
        assert_eq!(pipeline.task_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = PipelineBuilder::new("p")
            .task(ok_task("a"))
            .unwrap()
            .task(ok_task("a"))
            .unwrap_err();

        assert_eq!(err.code(), Some("CONTRACT-003-DUPLICATE"));
        assert_eq!(err.tasks, vec!["a".to_string()]);
    }

    #[test]
    fn test_empty_and_reserved_names_rejected() {
        let err = PipelineBuilder::new("p").task(ok_task("  ")).unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-001-EMPTY_NAME"));

        let err = PipelineBuilder::new("p").task(ok_task(START_TIME_KEY)).unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-002-RESERVED_NAME"));
    }

    #[test]
    fn test_dependency_must_precede() {
        // declared later
        let err = PipelineBuilder::new("p")
            .task(ok_task("transform").depends_on("extract"))
            .unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-MISSING_DEP"));

        // self reference
        let err = PipelineBuilder::new("p")
            .task(ok_task("loop").depends_on("loop"))
            .unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-MISSING_DEP"));
    }

    #[test]
    fn test_failed_append_leaves_pipeline_unchanged() {
        let mut pipeline = Pipeline::new("p");
        pipeline.add_task(ok_task("a")).unwrap();
        assert!(pipeline.add_task(ok_task("b").depends_on("zzz")).is_err());
        assert_eq!(pipeline.task_names(), vec!["a"]);
    }

    #[test]
    fn test_config_defaults_apply_to_work() {
        let config = PipelineConfig {
            max_retries: 5,
            retry_delay_ms: 20,
            backoff: BackoffStrategy::Exponential,
            attempt_timeout_ms: Some(500),
            deadline_ms: Some(10_000),
            ..PipelineConfig::default()
        };

        let pipeline = PipelineBuilder::new("p")
            .config(&config)
            .work("a", |_| Ok(json!(1)))
            .unwrap()
            .task(ok_task("b"))
            .unwrap()
            .build();

        let a = &pipeline.tasks()[0];
        assert_eq!(a.max_retries(), 5);
        assert_eq!(a.retry_policy().backoff, BackoffStrategy::Exponential);
        assert_eq!(a.attempt_timeout(), Some(Duration::from_millis(500)));

        // explicitly built tasks keep their own policy
        let b = &pipeline.tasks()[1];
        assert_eq!(b.max_retries(), 0);
        assert_eq!(b.attempt_timeout(), None);

        assert_eq!(pipeline.deadline(), Some(Duration::from_secs(10)));
    }
}
