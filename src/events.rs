//! Structured lifecycle events.
//!
//! The orchestrator reports everything that happens to a task as a
//! [`TaskEvent`] delivered to an [`EventSink`]. [`TracingSink`] is the default
//! sink and renders events as `tracing` records under the
//! `cronduct::events` target; tests and embedders can inject their own.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::callback::HookKind;
use crate::outcome::SkipReason;
use crate::{ErrorKind, TaskState};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Fired {
        task: String,
        retry_attempt: Option<u32>,
    },
    /// A fire arrived while the task was still in flight and was dropped.
    Misfired {
        task: String,
        state: TaskState,
    },
    Skipped {
        task: String,
        reason: SkipReason,
    },
    Started {
        task: String,
        attempt: u32,
    },
    Succeeded {
        task: String,
        attempt: u32,
        duration: Duration,
    },
    RetryScheduled {
        task: String,
        attempt: u32,
        delay: Duration,
        kind: ErrorKind,
        error: String,
    },
    Failed {
        task: String,
        attempts: u32,
        kind: ErrorKind,
        error: String,
    },
    CallbackFailed {
        task: String,
        hook: HookKind,
        error: String,
    },
    Paused {
        task: String,
    },
    Resumed {
        task: String,
    },
    ShutdownStarted,
    ShutdownCompleted {
        abandoned: usize,
    },
}

impl TaskEvent {
    pub fn task(&self) -> Option<&str> {
        match self {
            TaskEvent::Fired { task, .. }
            | TaskEvent::Misfired { task, .. }
            | TaskEvent::Skipped { task, .. }
            | TaskEvent::Started { task, .. }
            | TaskEvent::Succeeded { task, .. }
            | TaskEvent::RetryScheduled { task, .. }
            | TaskEvent::Failed { task, .. }
            | TaskEvent::CallbackFailed { task, .. }
            | TaskEvent::Paused { task }
            | TaskEvent::Resumed { task } => Some(task),
            TaskEvent::ShutdownStarted | TaskEvent::ShutdownCompleted { .. } => None,
        }
    }
}

/// Receives every lifecycle event. Called from worker tasks; must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TaskEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Fired { task, retry_attempt } => {
                debug!(target: "cronduct::events", event = "fire", task = %task, retry_attempt = ?retry_attempt, "task fired");
            }
            TaskEvent::Misfired { task, state } => {
                warn!(target: "cronduct::events", event = "misfire", task = %task, %state, "fire dropped; task still in flight");
            }
            TaskEvent::Skipped { task, reason } => {
                info!(target: "cronduct::events", event = "skip", task = %task, %reason, "task skipped");
            }
            TaskEvent::Started { task, attempt } => {
                debug!(target: "cronduct::events", event = "start", task = %task, attempt, "attempt started");
            }
            TaskEvent::Succeeded { task, attempt, duration } => {
                info!(
                    target: "cronduct::events",
                    event = "success",
                    task = %task,
                    attempt,
                    duration_ms = duration.as_millis() as u64,
                    "task completed successfully"
                );
            }
            TaskEvent::RetryScheduled { task, attempt, delay, kind, error } => {
                warn!(
                    target: "cronduct::events",
                    event = "retry",
                    task = %task,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %kind,
                    error = %error,
                    "attempt failed; retry scheduled"
                );
            }
            TaskEvent::Failed { task, attempts, kind, error } => {
                error!(
                    target: "cronduct::events",
                    event = "failure",
                    task = %task,
                    attempts,
                    %kind,
                    error = %error,
                    "task failed after exhausting retries"
                );
            }
            TaskEvent::CallbackFailed { task, hook, error } => {
                error!(target: "cronduct::events", event = "callback_error", task = %task, %hook, error = %error, "callback failed");
            }
            TaskEvent::Paused { task } => {
                info!(target: "cronduct::events", event = "pause", task = %task, "task paused");
            }
            TaskEvent::Resumed { task } => {
                info!(target: "cronduct::events", event = "resume", task = %task, "task resumed");
            }
            TaskEvent::ShutdownStarted => {
                info!(target: "cronduct::events", event = "shutdown", "shutdown started");
            }
            TaskEvent::ShutdownCompleted { abandoned } => {
                info!(target: "cronduct::events", event = "shutdown", abandoned, "shutdown completed");
            }
        }
    }
}
