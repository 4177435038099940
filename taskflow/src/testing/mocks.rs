//! Mock units of work for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::tasks::{Work, WorkResult};

/// A unit of work that fails a scripted number of times, then succeeds.
///
/// Records every call, including the context keys visible at the time, so
/// tests can assert whether and when a task was invoked.
#[derive(Debug)]
pub struct ScriptedWork {
    failures: Option<usize>,
    error: String,
    output: Value,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedWork {
    /// Always succeeds with `output`.
    #[must_use]
    pub fn succeeding(output: Value) -> Self {
        Self::failing_then(0, output)
    }

    /// Fails the first `failures` calls, then succeeds with `output`.
    #[must_use]
    pub fn failing_then(failures: usize, output: Value) -> Self {
        Self {
            failures: Some(failures),
            error: "scripted failure".to_string(),
            output,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails on every call with `error`.
    #[must_use]
    pub fn always_failing(error: impl Into<String>) -> Self {
        Self {
            failures: None,
            error: error.into(),
            output: Value::Null,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of times the work was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if the work was called at least once.
    #[must_use]
    pub fn was_called(&self) -> bool {
        self.calls() > 0
    }

    /// Returns the context keys visible on each call.
    #[must_use]
    pub fn seen_keys(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Work for ScriptedWork {
    async fn run(&self, ctx: &ExecutionContext) -> WorkResult {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(ctx.keys().map(str::to_string).collect());
            calls.len()
        };

        match self.failures {
            Some(failures) if call > failures => Ok(self.output.clone()),
            _ => Err(anyhow::anyhow!("{} (call {})", self.error, call)),
        }
    }
}

/// A unit of work that sleeps before succeeding.
#[derive(Debug)]
pub struct SlowWork {
    delay: Duration,
    output: Value,
}

impl SlowWork {
    /// Creates a new slow unit of work.
    #[must_use]
    pub fn new(delay: Duration, output: Value) -> Self {
        Self { delay, output }
    }
}

#[async_trait]
impl Work for SlowWork {
    async fn run(&self, _ctx: &ExecutionContext) -> WorkResult {
        tokio::time::sleep(self.delay).await;
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_work_fails_then_succeeds() {
        let work = ScriptedWork::failing_then(2, json!("ok"));
        let ctx = ExecutionContext::new();

        assert!(work.run(&ctx).await.is_err());
        assert!(work.run(&ctx).await.is_err());
        assert_eq!(work.run(&ctx).await.unwrap(), json!("ok"));
        assert_eq!(work.calls(), 3);
    }

    #[tokio::test]
    async fn test_always_failing_message() {
        let work = ScriptedWork::always_failing("disk full");
        let err = work.run(&ExecutionContext::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "disk full (call 1)");
    }

    #[tokio::test]
    async fn test_seen_keys_recorded() {
        let work = ScriptedWork::succeeding(json!(1));
        assert!(!work.was_called());
        work.run(&ExecutionContext::new()).await.unwrap();
        assert_eq!(work.seen_keys(), vec![vec!["start_time".to_string()]]);
    }

    #[tokio::test]
    async fn test_slow_work() {
        let work = SlowWork::new(Duration::from_millis(1), json!("late"));
        assert_eq!(work.run(&ExecutionContext::new()).await.unwrap(), json!("late"));
    }
}
