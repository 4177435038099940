//! Observable per-task state for in-flight runs.

use crate::core::TaskState;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// Shared view of each task's current [`TaskState`].
///
/// Cloning yields another handle onto the same states, so a supervisor can
/// poll progress while a run is in flight.
#[derive(Debug, Clone, Default)]
pub struct TaskStateTracker {
    states: Arc<RwLock<Vec<(String, TaskState)>>>,
}

impl TaskStateTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the tracker to `Pending` for each name, in order.
    pub fn reset<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        *self.states.write() = names
            .into_iter()
            .map(|name| (name.to_string(), TaskState::Pending))
            .collect();
    }

    /// Moves a task to a new state.
    ///
    /// Unknown tasks are registered as `Pending` first. Illegal transitions
    /// are applied anyway and logged.
    pub fn transition(&self, task: &str, next: TaskState) {
        let mut states = self.states.write();
        let index = if let Some(i) = states.iter().position(|(name, _)| name == task) {
            i
        } else {
            states.push((task.to_string(), TaskState::Pending));
            states.len() - 1
        };

        let current = states[index].1;
        if !current.can_transition_to(&next) {
            warn!(task = %task, from = %current, to = %next, "Unexpected task state transition");
        }
        states[index].1 = next;
    }

    /// Puts a task back to `Pending` so it can run again in the same run.
    pub(crate) fn rearm(&self, task: &str) {
        let mut states = self.states.write();
        match states.iter_mut().find(|(name, _)| name == task) {
            Some((_, state)) => *state = TaskState::Pending,
            None => states.push((task.to_string(), TaskState::Pending)),
        }
    }

    /// Returns a task's current state.
    #[must_use]
    pub fn state(&self, task: &str) -> Option<TaskState> {
        self.states
            .read()
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, state)| *state)
    }

    /// Returns every tracked task's state in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, TaskState)> {
        self.states.read().clone()
    }

    /// Returns the task currently attempting or waiting to retry, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<(String, TaskState)> {
        self.states
            .read()
            .iter()
            .find(|(_, state)| state.is_in_flight())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reset_registers_pending() {
        let tracker = TaskStateTracker::new();
        tracker.reset(["a", "b"]);
        assert_eq!(
            tracker.snapshot(),
            vec![
                ("a".to_string(), TaskState::Pending),
                ("b".to_string(), TaskState::Pending),
            ]
        );
    }

    #[test]
    fn test_transition_and_in_flight() {
        let tracker = TaskStateTracker::new();
        tracker.reset(["a", "b"]);
        tracker.transition("a", TaskState::Attempting { attempt: 1 });

        assert_eq!(
            tracker.in_flight(),
            Some(("a".to_string(), TaskState::Attempting { attempt: 1 }))
        );

        tracker.transition("a", TaskState::Succeeded { attempts: 1 });
        assert_eq!(tracker.state("a"), Some(TaskState::Succeeded { attempts: 1 }));
        assert!(tracker.in_flight().is_none());
    }

    #[test]
    fn test_unknown_task_is_registered() {
        let tracker = TaskStateTracker::new();
        tracker.transition("solo", TaskState::Attempting { attempt: 1 });
        assert_eq!(tracker.state("solo"), Some(TaskState::Attempting { attempt: 1 }));
    }

    #[test]
    fn test_clones_share_state() {
        let tracker = TaskStateTracker::new();
        let observer = tracker.clone();
        tracker.transition("a", TaskState::Skipped);
        assert_eq!(observer.state("a"), Some(TaskState::Skipped));
    }
}
