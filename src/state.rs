use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task within one fire cycle.
///
/// `Success`, `Failed` and `Skipped` close a cycle; the next independent fire
/// resets the task to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Success,
    Retrying,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed | TaskState::Skipped)
    }

    /// A task is in flight while an attempt runs or a retry is pending.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Retrying)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Pending, Running | Skipped) => true,
            (Running, Success | Retrying | Failed) => true,
            (Retrying, Running) => true,
            // a fresh fire reopens a closed cycle
            (Success | Failed | Skipped, Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Retrying => "retrying",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::TaskState::*;

    #[test]
    fn closed_cycles_reopen_only_through_pending() {
        for closed in [Success, Failed, Skipped] {
            assert!(closed.is_terminal());
            assert!(closed.can_transition_to(Pending));
            assert!(!closed.can_transition_to(Running));
        }
    }

    #[test]
    fn retry_loop_is_running_retrying_running() {
        assert!(Running.can_transition_to(Retrying));
        assert!(Retrying.can_transition_to(Running));
        assert!(!Retrying.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Success));
    }
}
