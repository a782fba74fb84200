use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::task::Action;
use crate::{AttemptError, TaskInput, TaskResult, panic_message};

/// Bounds the wall-clock duration of a single attempt.
///
/// The action runs on its own tokio task so that an overrun can be abandoned
/// and a panic inside the action is contained as [`AttemptError::Panicked`].
/// On overrun the attempt's token is cancelled and the task aborted at its
/// next await point; blocking code is left to finish on its own.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutEnforcer {
    timeout: Option<Duration>,
}

impl TimeoutEnforcer {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub async fn run(
        &self,
        task_id: &str,
        action: Arc<dyn Action>,
        ctx: CancellationToken,
        input: TaskInput,
    ) -> Result<TaskResult, AttemptError> {
        let attempt_ctx = ctx.child_token();
        let token = attempt_ctx.clone();
        let mut handle = tokio::spawn(async move { action.execute(token, &input).await });
        let abort = handle.abort_handle();

        let limit = self.timeout;
        let wait = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, &mut handle)
                    .await
                    .map_err(|_| limit),
                None => Ok((&mut handle).await),
            }
        };

        let joined = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                debug!(task = %task_id, "attempt cancelled by orchestrator");
                abort.abort();
                return Err(AttemptError::Cancelled);
            }
            res = wait => res,
        };

        match joined {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(AttemptError::Execution(e)),
            Ok(Err(e)) if e.is_panic() => {
                let msg = panic_message(&*e.into_panic());
                warn!(task = %task_id, panic = %msg, "action panicked");
                Err(AttemptError::Panicked(msg))
            }
            Ok(Err(_)) => Err(AttemptError::Cancelled),
            Err(limit) => {
                attempt_ctx.cancel();
                abort.abort();
                warn!(task = %task_id, timeout_ms = limit.as_millis() as u64, "attempt timed out");
                Err(AttemptError::Timeout(limit))
            }
        }
    }
}
