//! Task lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a task is in its retry loop.
///
/// Transitions: `Pending → Attempting → {Succeeded, Retrying, Failed}` and
/// `Retrying → Attempting`. Tasks never reached because an upstream task
/// failed end as `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskState {
    /// Not started yet.
    Pending,
    /// An attempt is in flight.
    Attempting {
        /// 1-based attempt number.
        attempt: usize,
    },
    /// Waiting before the next attempt.
    Retrying {
        /// The attempt that just failed.
        attempt: usize,
        /// Wait before the next attempt.
        delay_ms: u64,
    },
    /// Produced a result.
    Succeeded {
        /// Attempts used.
        attempts: usize,
    },
    /// Terminally failed.
    Failed {
        /// Attempts used.
        attempts: usize,
    },
    /// Never invoked because the run stopped earlier.
    Skipped,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Attempting { attempt } => write!(f, "attempting({attempt})"),
            Self::Retrying { attempt, delay_ms } => {
                write!(f, "retrying({attempt}, {delay_ms}ms)")
            }
            Self::Succeeded { attempts } => write!(f, "succeeded({attempts})"),
            Self::Failed { attempts } => write!(f, "failed({attempts})"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl TaskState {
    /// Returns true if the state represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::Skipped
        )
    }

    /// Returns true if the task is mid-loop.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Attempting { .. } | Self::Retrying { .. })
    }

    /// Returns true if the state indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Returns true if the transition from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Attempting { attempt }) => *attempt == 1,
            (Self::Pending, Self::Skipped | Self::Failed { .. }) => true,
            (Self::Attempting { attempt }, Self::Succeeded { attempts } | Self::Failed { attempts }) => {
                attempt == attempts
            }
            (Self::Attempting { attempt }, Self::Retrying { attempt: failed, .. }) => attempt == failed,
            (Self::Retrying { attempt, .. }, Self::Attempting { attempt: next }) => *next == attempt + 1,
            (Self::Retrying { attempt, .. }, Self::Failed { attempts }) => attempt == attempts,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_display() {
        assert_eq!(TaskState::Pending.to_string(), "pending");
        assert_eq!(TaskState::Attempting { attempt: 2 }.to_string(), "attempting(2)");
        assert_eq!(
            TaskState::Retrying { attempt: 1, delay_ms: 1000 }.to_string(),
            "retrying(1, 1000ms)"
        );
        assert_eq!(TaskState::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_task_state_is_terminal() {
        assert!(TaskState::Succeeded { attempts: 1 }.is_terminal());
        assert!(TaskState::Failed { attempts: 4 }.is_terminal());
        assert!(TaskState::Skipped.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Attempting { attempt: 1 }.is_terminal());
        assert!(TaskState::Retrying { attempt: 1, delay_ms: 0 }.is_in_flight());
    }

    #[test]
    fn test_transitions() {
        let pending = TaskState::Pending;
        let first = TaskState::Attempting { attempt: 1 };
        let waiting = TaskState::Retrying { attempt: 1, delay_ms: 10 };
        let second = TaskState::Attempting { attempt: 2 };

        assert!(pending.can_transition_to(&first));
        assert!(first.can_transition_to(&waiting));
        assert!(waiting.can_transition_to(&second));
        assert!(second.can_transition_to(&TaskState::Succeeded { attempts: 2 }));
        assert!(!second.can_transition_to(&TaskState::Succeeded { attempts: 1 }));
        assert!(!pending.can_transition_to(&second));
        assert!(!TaskState::Succeeded { attempts: 1 }.can_transition_to(&first));
    }

    #[test]
    fn test_task_state_serialize() {
        let json = serde_json::to_string(&TaskState::Retrying { attempt: 2, delay_ms: 500 }).unwrap();
        assert_eq!(json, r#"{"state":"retrying","attempt":2,"delay_ms":500}"#);

        let back: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskState::Retrying { attempt: 2, delay_ms: 500 });
    }
}
