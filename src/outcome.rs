use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AttemptError, TaskResult, TaskState};

/// Why a fired task did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    ConditionFalse,
    /// The predicate failed or panicked; treated as false.
    ConditionError { message: String },
    DependencyUnsatisfied { dependency: String, state: TaskState },
    DependencyMissing { dependency: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ConditionFalse => write!(f, "condition evaluated to false"),
            SkipReason::ConditionError { message } => {
                write!(f, "condition failed: {}", message)
            }
            SkipReason::DependencyUnsatisfied { dependency, state } => {
                write!(f, "dependency '{}' is {}", dependency, state)
            }
            SkipReason::DependencyMissing { dependency } => {
                write!(f, "dependency '{}' is not registered", dependency)
            }
        }
    }
}

/// What one fire or retry fire of a task ended in.
///
/// Returned by the attempt step and consumed by the orchestrator, which maps
/// each variant onto a state transition, metrics and callbacks.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success(TaskResult),
    RetryableFailure {
        error: AttemptError,
        attempt: u32,
        delay: Duration,
    },
    FinalFailure {
        error: AttemptError,
        attempt: u32,
    },
    Skipped(SkipReason),
}

impl ExecutionOutcome {
    /// The state the task is left in.
    pub fn state(&self) -> TaskState {
        match self {
            ExecutionOutcome::Success(_) => TaskState::Success,
            ExecutionOutcome::RetryableFailure { .. } => TaskState::Retrying,
            ExecutionOutcome::FinalFailure { .. } => TaskState::Failed,
            ExecutionOutcome::Skipped(_) => TaskState::Skipped,
        }
    }
}
