use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;
use thiserror::Error;

use crate::events::{EventSink, TaskEvent};
use crate::outcome::ExecutionOutcome;
use crate::task::Task;
use crate::{BoxError, panic_message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Success,
    Failure,
    Retry,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookKind::Success => "on_success",
            HookKind::Failure => "on_failure",
            HookKind::Retry => "on_retry",
        };
        f.write_str(s)
    }
}

/// A hook returned an error or panicked. Reported, never escalated.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{hook} callback of task '{task}' failed: {message}")]
pub struct CallbackError {
    pub task: String,
    pub hook: HookKind,
    pub message: String,
}

/// Invokes the hook matching an outcome, after its state has been committed.
pub struct CallbackDispatcher<'a> {
    sink: &'a dyn EventSink,
}

impl<'a> CallbackDispatcher<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink }
    }

    pub fn dispatch(&self, task: &Task, outcome: &ExecutionOutcome) -> Option<CallbackError> {
        let hooks = &task.hooks;
        let (hook, result) = match outcome {
            ExecutionOutcome::Success(result) => {
                let h = hooks.on_success.as_ref()?;
                (HookKind::Success, guarded(|| h.on_success(result)))
            }
            ExecutionOutcome::RetryableFailure { error, attempt, .. } => {
                let h = hooks.on_retry.as_ref()?;
                (HookKind::Retry, guarded(|| h.on_retry(error, *attempt)))
            }
            ExecutionOutcome::FinalFailure { error, .. } => {
                let h = hooks.on_failure.as_ref()?;
                (HookKind::Failure, guarded(|| h.on_failure(error)))
            }
            ExecutionOutcome::Skipped(_) => return None,
        };

        let message = result.err()?;
        self.sink.emit(&TaskEvent::CallbackFailed {
            task: task.id().to_string(),
            hook,
            error: message.clone(),
        });
        Some(CallbackError {
            task: task.id().to_string(),
            hook,
            message,
        })
    }
}

fn guarded(f: impl FnOnce() -> Result<(), BoxError>) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(&*payload))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::task::FnAction;
    use crate::{AttemptError, TaskResult};

    #[derive(Default)]
    struct Collect(Mutex<Vec<TaskEvent>>);

    impl EventSink for Collect {
        fn emit(&self, event: &TaskEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn builder() -> crate::TaskBuilder {
        Task::builder("job", FnAction::new(|_, _| async { Ok(TaskResult::new()) }))
    }

    #[test]
    fn retry_hook_receives_attempt_number() {
        let seen = Arc::new(AtomicU32::new(0));
        let s = Arc::clone(&seen);
        let task = builder()
            .on_retry(move |_, attempt| {
                s.store(attempt, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();

        let sink = Collect::default();
        let outcome = ExecutionOutcome::RetryableFailure {
            error: AttemptError::Timeout(Duration::from_secs(1)),
            attempt: 2,
            delay: Duration::from_secs(120),
        };
        assert!(CallbackDispatcher::new(&sink).dispatch(&task, &outcome).is_none());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_and_panicking_hooks_are_reported() {
        let task = builder()
            .on_success(|_| Err("notify failed".into()))
            .on_failure(|_| panic!("boom"))
            .build()
            .unwrap();
        let sink = Collect::default();
        let dispatcher = CallbackDispatcher::new(&sink);

        let err = dispatcher
            .dispatch(&task, &ExecutionOutcome::Success(TaskResult::new()))
            .unwrap();
        assert_eq!(err.hook, HookKind::Success);
        assert_eq!(err.message, "notify failed");

        let err = dispatcher
            .dispatch(
                &task,
                &ExecutionOutcome::FinalFailure {
                    error: AttemptError::Cancelled,
                    attempt: 1,
                },
            )
            .unwrap();
        assert_eq!(err.hook, HookKind::Failure);
        assert!(err.message.contains("boom"));

        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }
}
