//! Trigger engine contract.
//!
//! The orchestrator never computes fire times itself. It hands each task's
//! [`TriggerSpec`] to a [`TriggerEngine`] together with a [`FireHandle`], and the
//! engine calls [`FireHandle::fire`] whenever the task is due. Retries use the
//! same path through [`TriggerEngine::schedule_once`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::CronductError;

/// When a task fires. Opaque to the orchestrator; interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    Interval {
        every: Duration,
        #[serde(default)]
        immediate: bool,
    },
    At {
        at: DateTime<Utc>,
    },
    After {
        delay: Duration,
    },
    /// Fires only through `Orchestrator::fire`.
    Manual,
    Cron {
        expression: String,
    },
    Custom {
        config: serde_json::Value,
    },
}

impl TriggerSpec {
    pub fn every(every: Duration) -> Self {
        TriggerSpec::Interval {
            every,
            immediate: false,
        }
    }

    pub fn cron(expression: impl Into<String>) -> Self {
        TriggerSpec::Cron {
            expression: expression.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireKind {
    /// A regular fire from the task's own trigger; opens a new cycle.
    Scheduled,
    /// A one-off re-fire that runs the given attempt of the current cycle.
    Retry { attempt: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireEvent {
    pub task_id: String,
    pub kind: FireKind,
}

/// Delivers fire events for one task to the orchestrator.
#[derive(Debug, Clone)]
pub struct FireHandle {
    task_id: String,
    kind: FireKind,
    tx: mpsc::UnboundedSender<FireEvent>,
}

impl FireHandle {
    pub(crate) fn new(task_id: &str, kind: FireKind, tx: mpsc::UnboundedSender<FireEvent>) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind,
            tx,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn kind(&self) -> FireKind {
        self.kind
    }

    /// Returns `false` once the orchestrator no longer accepts fires.
    pub fn fire(&self) -> bool {
        self.tx
            .send(FireEvent {
                task_id: self.task_id.clone(),
                kind: self.kind,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub trait TriggerEngine: Send + Sync {
    fn schedule_recurring(
        &self,
        task_id: &str,
        spec: &TriggerSpec,
        on_fire: FireHandle,
    ) -> Result<(), CronductError>;

    fn schedule_once(
        &self,
        task_id: &str,
        delay: Duration,
        on_fire: FireHandle,
    ) -> Result<(), CronductError>;

    /// Drops every pending fire for `task_id`.
    fn cancel(&self, task_id: &str);

    fn cancel_all(&self);
}

/// Built-in engine driven by tokio timers.
///
/// Handles `Interval`, `At`, `After` and `Manual`; cron expressions and custom
/// specs need an engine that understands them. Must be used from within a
/// tokio runtime.
#[derive(Debug, Default)]
pub struct TokioTriggerEngine {
    root: CancellationToken,
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl TokioTriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn token_for(&self, task_id: &str) -> CancellationToken {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens
            .entry(task_id.to_string())
            .or_insert_with(|| self.root.child_token())
            .clone()
    }

    fn spawn_once(&self, task_id: &str, delay: Duration, on_fire: FireHandle) {
        let token = self.token_for(task_id);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!(task = %on_fire.task_id(), "one-off fire cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    on_fire.fire();
                }
            }
        });
    }
}

impl TriggerEngine for TokioTriggerEngine {
    fn schedule_recurring(
        &self,
        task_id: &str,
        spec: &TriggerSpec,
        on_fire: FireHandle,
    ) -> Result<(), CronductError> {
        match spec {
            TriggerSpec::Interval { every, immediate } => {
                if every.is_zero() {
                    return Err(CronductError::Trigger(format!(
                        "interval of task '{}' must be positive",
                        task_id
                    )));
                }
                let token = self.token_for(task_id);
                let every = *every;
                let start = if *immediate {
                    Instant::now()
                } else {
                    Instant::now().checked_add(every).ok_or_else(|| {
                        CronductError::Trigger(format!("interval of task '{}' is too long", task_id))
                    })?
                };
                debug!(task = %task_id, every_ms = every.as_millis() as u64, "interval trigger scheduled");

                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval_at(start, every);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = ticker.tick() => {
                                if !on_fire.fire() {
                                    break;
                                }
                            }
                        }
                    }
                });
                Ok(())
            }
            TriggerSpec::At { at } => {
                let delay = (*at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                self.spawn_once(task_id, delay, on_fire);
                Ok(())
            }
            TriggerSpec::After { delay } => {
                self.spawn_once(task_id, *delay, on_fire);
                Ok(())
            }
            TriggerSpec::Manual => Ok(()),
            TriggerSpec::Cron { expression } => Err(CronductError::UnsupportedTrigger(format!(
                "cron expression '{}'",
                expression
            ))),
            TriggerSpec::Custom { .. } => Err(CronductError::UnsupportedTrigger(
                "custom trigger".to_string(),
            )),
        }
    }

    fn schedule_once(
        &self,
        task_id: &str,
        delay: Duration,
        on_fire: FireHandle,
    ) -> Result<(), CronductError> {
        if self.root.is_cancelled() {
            return Err(CronductError::Trigger("engine has been stopped".to_string()));
        }
        self.spawn_once(task_id, delay, on_fire);
        Ok(())
    }

    fn cancel(&self, task_id: &str) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = tokens.remove(task_id) {
            token.cancel();
        }
    }

    fn cancel_all(&self) {
        self.root.cancel();
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
