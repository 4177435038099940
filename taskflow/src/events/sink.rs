//! Event sink trait and implementations.

use serde_json::Value;
use tracing::{debug, error, info, warn, Level};

use super::event_types;

/// Trait for sinks receiving lifecycle events.
///
/// The runner emits one event per pipeline start, task attempt start,
/// attempt failure, retry wait, task success, task terminal failure and
/// pipeline completion.
pub trait EventSink: Send + Sync {
    /// Emits an event without blocking.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The type of event (e.g., "task.started")
    /// * `data` - Optional event data
    ///
    /// This method must never panic; delivery problems are the sink's own
    /// concern.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// An event sink that logs events using the tracing framework.
///
/// Routine events are logged at the configured level. Attempt failures are
/// logged at `warn`, terminal task failures at `error`, and a failed
/// pipeline completion at `error` tagged `severity = "critical"`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    /// The log level for routine events.
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_event(&self, event_type: &str, data: Option<&Value>) {
        let field = |key: &str| {
            data.and_then(|d| d.get(key))
                .map_or_else(String::new, |v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
        };

        match event_type {
            event_types::TASK_ATTEMPT_FAILED => {
                warn!(
                    event_type = %event_type,
                    task = %field("task"),
                    attempt = %field("attempt"),
                    max_attempts = %field("max_attempts"),
                    error = %field("error"),
                    "Task {} failed (attempt {}/{})",
                    field("task"),
                    field("attempt"),
                    field("max_attempts"),
                );
            }
            event_types::TASK_FAILED => {
                error!(
                    event_type = %event_type,
                    task = %field("task"),
                    attempts = %field("attempts"),
                    error = %field("error"),
                    "Task {} failed permanently",
                    field("task"),
                );
            }
            event_types::PIPELINE_COMPLETED
                if data.and_then(|d| d.get("success")).and_then(Value::as_bool) == Some(false) =>
            {
                error!(
                    event_type = %event_type,
                    severity = "critical",
                    pipeline = %field("pipeline"),
                    failed_task = %field("failed_task"),
                    "Pipeline {} failed at task {}. Stopping execution.",
                    field("pipeline"),
                    field("failed_task"),
                );
            }
            _ => {
                if self.level == Level::DEBUG {
                    debug!(event_type = %event_type, event_data = ?data, "Event: {}", event_type);
                } else {
                    info!(event_type = %event_type, event_data = ?data, "Event: {}", event_type);
                }
            }
        }
    }
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// An event sink that records every event, for tests and supervisors.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<Value>)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Counts events of an exact type.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events.read().iter().filter(|(t, _)| t == event_type).count()
    }

    /// Returns the payloads of events of an exact type that concern `task`.
    #[must_use]
    pub fn task_events(&self, event_type: &str, task: &str) -> Vec<Value> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .filter_map(|(_, d)| d.clone())
            .filter(|d| d.get("task").and_then(Value::as_str) == Some(task))
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn records(&self) -> Vec<Value> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn capture(emit: impl FnOnce()) -> Vec<Value> {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(Level::TRACE)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, emit);
        logs.records()
    }

    #[test]
    fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.try_emit("test", Some(json!({"x": 1})));
    }

    #[test]
    fn test_logging_sink_handles_every_event_type() {
        let sink = LoggingEventSink::default();
        sink.try_emit(event_types::PIPELINE_STARTED, Some(json!({"pipeline": "p"})));
        sink.try_emit(
            event_types::TASK_ATTEMPT_FAILED,
            Some(json!({"task": "t", "attempt": 1, "max_attempts": 4, "error": "boom"})),
        );
        sink.try_emit(event_types::TASK_FAILED, Some(json!({"task": "t", "attempts": 4})));
        sink.try_emit(
            event_types::PIPELINE_COMPLETED,
            Some(json!({"pipeline": "p", "success": false, "failed_task": "t"})),
        );
        sink.try_emit("custom.event", None);
        LoggingEventSink::debug().try_emit(event_types::TASK_STARTED, None);
    }

    #[test]
    fn test_logging_sink_levels_and_fields() {
        let records = capture(|| {
            let sink = LoggingEventSink::default();
            sink.try_emit(
                event_types::TASK_ATTEMPT_FAILED,
                Some(json!({"task": "load", "attempt": 2, "max_attempts": 4, "error": "timeout"})),
            );
            sink.try_emit(
                event_types::TASK_FAILED,
                Some(json!({"task": "load", "attempts": 4, "error": "timeout"})),
            );
            sink.try_emit(
                event_types::PIPELINE_COMPLETED,
                Some(json!({"pipeline": "ingest", "success": false, "failed_task": "load"})),
            );
            sink.try_emit(
                event_types::PIPELINE_COMPLETED,
                Some(json!({"pipeline": "ingest", "success": true})),
            );
        });

        assert_eq!(records.len(), 4);

        let attempt = &records[0];
        assert_eq!(attempt["level"], json!("WARN"));
        assert_eq!(attempt["fields"]["event_type"], json!("task.attempt_failed"));
        assert_eq!(attempt["fields"]["task"], json!("load"));
        assert_eq!(attempt["fields"]["attempt"], json!("2"));
        assert_eq!(attempt["fields"]["max_attempts"], json!("4"));
        assert_eq!(attempt["fields"]["error"], json!("timeout"));
        assert_eq!(attempt["fields"]["message"], json!("Task load failed (attempt 2/4)"));

        let terminal = &records[1];
        assert_eq!(terminal["level"], json!("ERROR"));
        assert_eq!(terminal["fields"]["task"], json!("load"));
        assert_eq!(terminal["fields"]["attempts"], json!("4"));

        let critical = &records[2];
        assert_eq!(critical["level"], json!("ERROR"));
        assert_eq!(critical["fields"]["severity"], json!("critical"));
        assert_eq!(critical["fields"]["pipeline"], json!("ingest"));
        assert_eq!(critical["fields"]["failed_task"], json!("load"));
        assert_eq!(
            critical["fields"]["message"],
            json!("Pipeline ingest failed at task load. Stopping execution.")
        );

        let routine = &records[3];
        assert_eq!(routine["level"], json!("INFO"));
        assert!(routine["fields"].get("severity").is_none());
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.try_emit("event1", None);
        sink.try_emit("event2", Some(json!({"data": true})));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.event_types(), vec!["event1".to_string(), "event2".to_string()]);
    }

    #[test]
    fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        sink.try_emit("task.started", Some(json!({"task": "a"})));
        sink.try_emit("task.succeeded", Some(json!({"task": "a"})));
        sink.try_emit("task.started", Some(json!({"task": "b"})));
        sink.try_emit("pipeline.completed", None);

        assert_eq!(sink.events_of_type("task.").len(), 3);
        assert_eq!(sink.count("task.started"), 2);
        assert_eq!(sink.task_events("task.started", "b").len(), 1);
    }

    #[test]
    fn test_collecting_sink_clear() {
        let sink = CollectingEventSink::new();
        sink.try_emit("event", None);
        assert_eq!(sink.len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
