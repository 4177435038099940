//! A named unit of work with a bounded retry loop.

use super::{AsyncFnWork, FnWork, TaskStateTracker, Work, WorkResult};
use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::core::TaskState;
use crate::errors::{FailureCause, TaskFailure};
use crate::events::{event_types, EventSink, LoggingEventSink};
use crate::pipeline::{RetryDecision, RetryPolicy};
use serde_json::json;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// The collaborators a task reports to while it runs.
#[derive(Clone)]
pub struct TaskRuntime {
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    tracker: TaskStateTracker,
    deadline: Option<(Instant, Duration)>,
}

impl TaskRuntime {
    /// Creates a runtime reporting to `sink`, never cancelled, no deadline.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            cancel: Arc::new(CancellationToken::new()),
            tracker: TaskStateTracker::new(),
            deadline: None,
        }
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the state tracker.
    #[must_use]
    pub fn with_tracker(mut self, tracker: TaskStateTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Sets a deadline `budget` from now.
    #[must_use]
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    /// Returns the event sink.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Returns the state tracker.
    #[must_use]
    pub fn tracker(&self) -> &TaskStateTracker {
        &self.tracker
    }

    /// Returns why the current run must stop, if it must.
    pub(crate) fn interruption(&self) -> Option<FailureCause> {
        if self.cancel.is_cancelled() {
            return Some(FailureCause::Cancelled {
                reason: self.cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
            });
        }
        match self.deadline {
            Some((at, budget)) if Instant::now() >= at => Some(FailureCause::DeadlineExceeded(budget)),
            _ => None,
        }
    }

    /// Waits out a retry delay, waking early on cancellation or deadline.
    async fn wait(&self, delay: Duration) -> Option<FailureCause> {
        let bounded = match self.deadline {
            Some((at, _)) => delay.min(at.saturating_duration_since(Instant::now())),
            None => delay,
        };

        if !bounded.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(bounded) => {}
                () = self.cancel.cancelled() => {}
            }
        }
        self.interruption()
    }
}

impl Default for TaskRuntime {
    fn default() -> Self {
        Self::new(Arc::new(LoggingEventSink::default()))
    }
}

impl Debug for TaskRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRuntime")
            .field("cancel", &self.cancel)
            .field("tracker", &self.tracker)
            .field("deadline", &self.deadline.map(|(_, budget)| budget))
            .finish_non_exhaustive()
    }
}

/// A successful task result.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSuccess {
    /// The value to store under the task's name.
    pub value: serde_json::Value,
    /// Attempts used, including the successful one.
    pub attempts: usize,
    /// Wall time across all attempts and waits.
    pub duration_ms: f64,
}

/// A named unit of work with a retry budget.
///
/// Total attempts are `max_retries + 1`. Between attempts the task waits
/// according to its [`RetryPolicy`], by default one second.
#[derive(Clone)]
pub struct Task {
    name: String,
    work: Arc<dyn Work>,
    retry: RetryPolicy,
    attempt_timeout: Option<Duration>,
    dependencies: Vec<String>,
}

impl Task {
    /// Creates a task from a synchronous closure.
    pub fn new<F>(name: impl Into<String>, work: F, max_retries: usize) -> Self
    where
        F: Fn(&ExecutionContext) -> WorkResult + Send + Sync + 'static,
    {
        Self::from_work(name, Arc::new(FnWork::new(work)), max_retries)
    }

    /// Creates a task from an async closure.
    pub fn from_async<F, Fut>(name: impl Into<String>, work: F, max_retries: usize) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        Self::from_work(name, Arc::new(AsyncFnWork::new(work)), max_retries)
    }

    /// Creates a task from any [`Work`] implementation.
    pub fn from_work(name: impl Into<String>, work: Arc<dyn Work>, max_retries: usize) -> Self {
        Self {
            name: name.into(),
            work,
            retry: RetryPolicy::default().with_max_retries(max_retries),
            attempt_timeout: None,
            dependencies: Vec::new(),
        }
    }

    /// Replaces the retry policy, including the retry budget.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the wait between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry = self.retry.with_base_delay(delay);
        self
    }

    /// Bounds each attempt; an attempt that overruns counts as failed.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Declares that this task reads the result of `task`.
    #[must_use]
    pub fn depends_on(mut self, task: impl Into<String>) -> Self {
        self.dependencies.push(task.into());
        self
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the retry budget.
    #[must_use]
    pub fn max_retries(&self) -> usize {
        self.retry.max_retries
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the attempt timeout, if any.
    #[must_use]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Runs the task until it succeeds or its retry budget is spent.
    ///
    /// Cancellation and the deadline are checked before every attempt and
    /// during retry waits; an attempt in flight is never interrupted by them.
    ///
    /// # Errors
    ///
    /// Returns `TaskFailure` when retries are exhausted, the run was
    /// cancelled, or the deadline passed.
    pub async fn run(&self, ctx: &ExecutionContext, rt: &TaskRuntime) -> Result<TaskSuccess, TaskFailure> {
        let max_attempts = self.retry.max_attempts();
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            if let Some(cause) = rt.interruption() {
                return Err(self.fail(rt, attempt, cause));
            }

            attempt += 1;
            rt.tracker.transition(&self.name, TaskState::Attempting { attempt });
            rt.sink.try_emit(
                event_types::TASK_STARTED,
                Some(json!({
                    "task": &self.name,
                    "attempt": attempt,
                    "max_attempts": max_attempts,
                })),
            );

            let error = match self.attempt(ctx).await {
                Ok(value) => {
                    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                    rt.tracker.transition(&self.name, TaskState::Succeeded { attempts: attempt });
                    rt.sink.try_emit(
                        event_types::TASK_SUCCEEDED,
                        Some(json!({
                            "task": &self.name,
                            "attempts": attempt,
                            "duration_ms": duration_ms,
                        })),
                    );
                    return Ok(TaskSuccess {
                        value,
                        attempts: attempt,
                        duration_ms,
                    });
                }
                Err(error) => error,
            };

            rt.sink.try_emit(
                event_types::TASK_ATTEMPT_FAILED,
                Some(json!({
                    "task": &self.name,
                    "attempt": attempt,
                    "max_attempts": max_attempts,
                    "error": format!("{error:#}"),
                })),
            );

            match self.retry.decide(attempt) {
                RetryDecision::GiveUp => {
                    return Err(self.fail(rt, attempt, FailureCause::Work(error)));
                }
                RetryDecision::Retry(delay) => {
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    rt.tracker
                        .transition(&self.name, TaskState::Retrying { attempt, delay_ms });
                    rt.sink.try_emit(
                        event_types::TASK_RETRYING,
                        Some(json!({
                            "task": &self.name,
                            "attempt": attempt,
                            "delay_ms": delay_ms,
                        })),
                    );
                    if let Some(cause) = rt.wait(delay).await {
                        return Err(self.fail(rt, attempt, cause));
                    }
                }
            }
        }
    }

    async fn attempt(&self, ctx: &ExecutionContext) -> WorkResult {
        match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.work.run(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("attempt timed out after {limit:?}")),
            },
            None => self.work.run(ctx).await,
        }
    }

    fn fail(&self, rt: &TaskRuntime, attempts: usize, cause: FailureCause) -> TaskFailure {
        rt.tracker.transition(&self.name, TaskState::Failed { attempts });
        rt.sink.try_emit(
            event_types::TASK_FAILED,
            Some(json!({
                "task": &self.name,
                "attempts": attempts,
                "error": cause.to_string(),
            })),
        );
        TaskFailure::new(self.name.clone(), attempts, cause)
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
