use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

use crate::outcome::SkipReason;
use crate::panic_message;
use crate::task::Task;

/// Evaluates a task's optional run condition.
///
/// A failing or panicking predicate counts as false: the task is skipped, never run.
pub struct ConditionalGate;

impl ConditionalGate {
    pub fn should_run(task: &Task) -> bool {
        Self::check(task).is_ok()
    }

    pub fn check(task: &Task) -> Result<(), SkipReason> {
        let Some(condition) = task.condition() else {
            return Ok(());
        };

        match catch_unwind(AssertUnwindSafe(|| condition.evaluate())) {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(SkipReason::ConditionFalse),
            Ok(Err(e)) => {
                warn!(task = %task.id(), error = %e, "condition failed; skipping");
                Err(SkipReason::ConditionError {
                    message: e.to_string(),
                })
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                warn!(task = %task.id(), panic = %message, "condition panicked; skipping");
                Err(SkipReason::ConditionError { message })
            }
        }
    }
}
