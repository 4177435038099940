//! The run-scoped execution context shared between tasks.

use crate::errors::{DataConflictError, MissingEntryError};
use crate::utils::{format_timestamp, now_utc, Timestamp};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Reserved context key holding the run's start time.
pub const START_TIME_KEY: &str = "start_time";

/// Results produced during a single pipeline run, keyed by task name.
///
/// Entries keep insertion order, which equals execution order. Only the
/// driver writes entries; units of work get shared read access.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Identifier of the run that owns this context.
    run_id: Uuid,
    /// When the run started.
    started_at: Timestamp,
    /// Entries in insertion order.
    entries: Vec<(String, Value)>,
    /// Key to position in `entries`.
    index: HashMap<String, usize>,
}

impl ExecutionContext {
    /// Creates a fresh context with the reserved start-time entry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    /// Creates a fresh context for a specific run ID.
    #[must_use]
    pub fn with_run_id(run_id: Uuid) -> Self {
        let started_at = now_utc();
        let mut ctx = Self {
            run_id,
            started_at,
            entries: Vec::new(),
            index: HashMap::new(),
        };
        ctx.push(START_TIME_KEY.to_string(), Value::String(format_timestamp(&started_at)));
        ctx
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the run's start time.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Gets an entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Gets an entry that an upstream task must have produced.
    ///
    /// # Errors
    ///
    /// Returns `MissingEntryError` if no task wrote `key` in this run.
    pub fn require(&self, key: &str) -> Result<&Value, MissingEntryError> {
        self.get(key).ok_or_else(|| MissingEntryError::new(key))
    }

    /// Deserializes an upstream entry into a typed value.
    pub fn require_as<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        let value = self.require(key)?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the number of entries, including the reserved start time.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the context holds nothing but the start time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.task_entry_count() == 0
    }

    /// Returns the number of entries written by tasks.
    #[must_use]
    pub fn task_entry_count(&self) -> usize {
        self.entries.len() - 1
    }

    /// Returns all keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns task-produced entries as a map, without the start time.
    #[must_use]
    pub fn task_results(&self) -> HashMap<String, Value> {
        self.entries
            .iter()
            .filter(|(k, _)| k != START_TIME_KEY)
            .cloned()
            .collect()
    }

    /// Records a task result. Each key may be written once per run.
    pub(crate) fn insert(&mut self, key: &str, value: Value) -> Result<(), DataConflictError> {
        if self.index.contains_key(key) {
            return Err(DataConflictError::new(key));
        }
        self.push(key.to_string(), value);
        Ok(())
    }

    /// Records a result, replacing any earlier value for a revisited node.
    ///
    /// The key keeps its original position.
    pub(crate) fn replace(&mut self, key: &str, value: Value) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 = value,
            None => self.push(key.to_string(), value),
        }
    }

    fn push(&mut self, key: String, value: Value) {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
