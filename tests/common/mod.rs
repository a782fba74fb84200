#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use cronduct::{
    CronductError, EventSink, FireHandle, Orchestrator, OrchestratorConfig, TaskEvent, TaskState,
    TriggerEngine, TriggerSpec,
};
use tracing_subscriber::{EnvFilter, fmt};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Output is captured per test and only printed for failing tests unless
/// run with `-- --nocapture`. Enable levels with `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Engine that records every request. One-off fires (retries) are delivered
/// immediately so backoff delays can be asserted without waiting them out,
/// unless the engine was built with [`RecordingEngine::deferring`].
#[derive(Default)]
pub struct RecordingEngine {
    pub recurring: Mutex<Vec<(String, TriggerSpec)>>,
    pub once_delays: Mutex<Vec<(String, Duration)>>,
    pub cancelled: Mutex<Vec<String>>,
    handles: Mutex<Vec<FireHandle>>,
    defer_once: bool,
    deferred: Mutex<Vec<FireHandle>>,
}

impl RecordingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Holds one-off fires until [`release_deferred`](Self::release_deferred).
    pub fn deferring() -> Arc<Self> {
        Arc::new(Self {
            defer_once: true,
            ..Self::default()
        })
    }

    /// Delivers the held one-off fires of `task_id`; returns how many were sent.
    pub fn release_deferred(&self, task_id: &str) -> usize {
        let mut deferred = self.deferred.lock().unwrap();
        let (due, rest): (Vec<_>, Vec<_>) =
            deferred.drain(..).partition(|h| h.task_id() == task_id);
        *deferred = rest;
        due.into_iter().filter(|h| h.fire()).count()
    }

    pub fn delays_for(&self, task_id: &str) -> Vec<Duration> {
        self.once_delays
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, d)| *d)
            .collect()
    }

    /// Fires the recurring trigger of `task_id` as if it had elapsed.
    pub fn tick(&self, task_id: &str) -> bool {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.task_id() == task_id)
            .map(|h| h.fire())
            .last()
            .unwrap_or(false)
    }
}

impl TriggerEngine for RecordingEngine {
    fn schedule_recurring(
        &self,
        task_id: &str,
        spec: &TriggerSpec,
        on_fire: FireHandle,
    ) -> Result<(), CronductError> {
        if let TriggerSpec::Cron { expression } = spec {
            return Err(CronductError::UnsupportedTrigger(expression.clone()));
        }
        self.recurring
            .lock()
            .unwrap()
            .push((task_id.to_string(), spec.clone()));
        self.handles.lock().unwrap().push(on_fire);
        Ok(())
    }

    fn schedule_once(
        &self,
        task_id: &str,
        delay: Duration,
        on_fire: FireHandle,
    ) -> Result<(), CronductError> {
        self.once_delays
            .lock()
            .unwrap()
            .push((task_id.to_string(), delay));
        if self.defer_once {
            self.deferred.lock().unwrap().push(on_fire);
        } else {
            on_fire.fire();
        }
        Ok(())
    }

    fn cancel(&self, task_id: &str) {
        self.cancelled.lock().unwrap().push(task_id.to_string());
        self.handles.lock().unwrap().retain(|h| h.task_id() != task_id);
        self.deferred.lock().unwrap().retain(|h| h.task_id() != task_id);
    }

    fn cancel_all(&self) {
        self.handles.lock().unwrap().clear();
        self.deferred.lock().unwrap().clear();
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<TaskEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&TaskEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &TaskEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn quiet_config() -> OrchestratorConfig {
    OrchestratorConfig {
        handle_signals: false,
        ..Default::default()
    }
}

/// Orchestrator wired to a recording engine and sink.
pub fn recording_orchestrator(
    config: OrchestratorConfig,
) -> (Orchestrator, Arc<RecordingEngine>, Arc<RecordingSink>) {
    orchestrator_with_engine(config, RecordingEngine::new())
}

pub fn orchestrator_with_engine(
    config: OrchestratorConfig,
    engine: Arc<RecordingEngine>,
) -> (Orchestrator, Arc<RecordingEngine>, Arc<RecordingSink>) {
    let sink = RecordingSink::new();
    let orch = Orchestrator::builder()
        .config(config)
        .engine(engine.clone())
        .event_sink(sink.clone())
        .build()
        .unwrap();
    (orch, engine, sink)
}

/// Polls `check` until it returns true or 30s (real or paused) pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(orch: &Orchestrator, task_id: &str, state: TaskState) {
    eventually(|| async move { orch.get_state(task_id).await.ok() == Some(state) }).await;
}
