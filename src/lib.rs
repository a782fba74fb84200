pub mod task;
pub mod state;
pub mod graph;
pub mod registry;
pub mod resolver;
pub mod gate;
pub mod retry;
pub mod timeout;
pub mod callback;
pub mod metrics;
pub mod outcome;
pub mod events;
pub mod trigger;
pub mod config;
pub mod logging;
pub mod orchestrator;

pub use task::{
    Action, BlockingAction, Condition, FailureHook, FnAction, RetryHook, SuccessHook, Task,
    TaskBuilder,
};
pub use state::TaskState;
pub use retry::{MAX_RETRY_DELAY, RetryController, RetryDecision, RetryPolicy};
pub use timeout::TimeoutEnforcer;
pub use metrics::{GlobalMetrics, JobMetrics, MetricsSnapshot};
pub use outcome::{ExecutionOutcome, SkipReason};
pub use events::{EventSink, TaskEvent, TracingSink};
pub use trigger::{FireHandle, TokioTriggerEngine, TriggerEngine, TriggerSpec};
pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TaskResult = HashMap<String, serde_json::Value>;
pub type TaskInput = HashMap<String, serde_json::Value>;
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum CronductError {
    #[error("Invalid task: {0}")]
    Validation(#[from] ValidationError),
    #[error("Task not found: {0}")]
    NotFound(String),
    #[error("Orchestrator already started")]
    AlreadyStarted,
    #[error("Orchestrator has been shut down")]
    ShutDown,
    #[error("Trigger engine error: {0}")]
    Trigger(String),
    #[error("Trigger not supported by this engine: {0}")]
    UnsupportedTrigger(String),
    #[error("Task {task}: illegal state transition {from} -> {to}")]
    IllegalTransition {
        task: String,
        from: TaskState,
        to: TaskState,
    },
}

/// Registration-time rejections. These never reach the execution loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task id must not be empty")]
    EmptyId,
    #[error("task '{0}' is already registered")]
    DuplicateId(String),
    #[error("task '{0}' depends on itself")]
    SelfDependency(String),
    #[error("dependency '{dependency}' of task '{task}' would close a cycle")]
    CyclicDependency { task: String, dependency: String },
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

/// Why a single attempt failed.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("execution failed: {0}")]
    Execution(BoxError),
    #[error("attempt exceeded timeout of {0:?}")]
    Timeout(Duration),
    #[error("action panicked: {0}")]
    Panicked(String),
    #[error("attempt cancelled")]
    Cancelled,
}

impl AttemptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttemptError::Execution(_) => ErrorKind::Execution,
            AttemptError::Timeout(_) => ErrorKind::Timeout,
            AttemptError::Panicked(_) => ErrorKind::Panic,
            AttemptError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Execution,
    Timeout,
    Panic,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Execution => "execution",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Panic => "panic",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
