use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::callback::CallbackDispatcher;
use crate::events::{EventSink, TaskEvent, TracingSink};
use crate::gate::ConditionalGate;
use crate::metrics::{JobMetrics, MetricsAggregator, MetricsSnapshot, RunOutcome};
use crate::outcome::{ExecutionOutcome, SkipReason};
use crate::registry::Registry;
use crate::resolver::DependencyResolver;
use crate::retry::{MAX_RETRY_DELAY, RetryController, RetryDecision};
use crate::task::Task;
use crate::timeout::TimeoutEnforcer;
use crate::trigger::{FireEvent, FireHandle, FireKind, TokioTriggerEngine, TriggerEngine, TriggerSpec};
use crate::{CronductError, OrchestratorConfig, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Registry and metrics, guarded together so every dependency check sees a
/// consistent snapshot of task states.
struct Shared {
    registry: Registry,
    metrics: MetricsAggregator,
}

struct Inner {
    config: OrchestratorConfig,
    shared: Mutex<Shared>,
    engine: Arc<dyn TriggerEngine>,
    sink: Arc<dyn EventSink>,
    events: broadcast::Sender<TaskEvent>,
    fire_tx: mpsc::UnboundedSender<FireEvent>,
    fire_rx: Mutex<Option<mpsc::UnboundedReceiver<FireEvent>>>,
    workers: Semaphore,
    tracker: TaskTracker,
    /// Cancelled when shutdown begins; the execution loop stops on it.
    accepting: CancellationToken,
    /// Cancelled when the grace period runs out; in-flight attempts observe it.
    attempts: CancellationToken,
    lifecycle: watch::Sender<Lifecycle>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

/// What a scheduled fire found when it tried to open a cycle.
enum Claim {
    Unknown,
    Paused,
    Misfire(TaskState),
    Claimed(Arc<Task>),
}

/// Turns trigger firings into governed task executions.
///
/// Cheap to clone; clones share the same registry, metrics and worker pool.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    engine: Option<Arc<dyn TriggerEngine>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn TriggerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Orchestrator, CronductError> {
        self.config.validate()?;

        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.config.event_buffer);
        let (lifecycle, _) = watch::channel(Lifecycle::Idle);

        let inner = Inner {
            workers: Semaphore::new(self.config.max_workers),
            config: self.config,
            shared: Mutex::new(Shared {
                registry: Registry::new(),
                metrics: MetricsAggregator::new(),
            }),
            engine: self
                .engine
                .unwrap_or_else(|| Arc::new(TokioTriggerEngine::new())),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            events,
            fire_tx,
            fire_rx: Mutex::new(Some(fire_rx)),
            tracker: TaskTracker::new(),
            accepting: CancellationToken::new(),
            attempts: CancellationToken::new(),
            lifecycle,
            loop_handle: Mutex::new(None),
        };

        Ok(Orchestrator {
            inner: Arc::new(inner),
        })
    }
}

impl Orchestrator {
    /// An orchestrator with the built-in tokio trigger engine and tracing sink.
    pub fn new(config: OrchestratorConfig) -> Result<Self, CronductError> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder {
            config: OrchestratorConfig::default(),
            engine: None,
            sink: None,
        }
    }

    /// Adds a task. Rejects duplicate ids, self dependencies and cycles.
    ///
    /// Registering while running schedules the task's trigger right away; if the
    /// engine refuses the trigger the registration is rolled back.
    pub async fn register(&self, task: Task) -> Result<(), CronductError> {
        let id = task.id().to_string();
        let trigger = task.trigger().clone();
        // lifecycle is read under the lock so `start` cannot schedule this task twice
        let running = {
            let mut shared = self.inner.shared.lock().await;
            let running = match self.lifecycle() {
                Lifecycle::Idle => false,
                Lifecycle::Running => true,
                Lifecycle::Stopping | Lifecycle::Stopped => return Err(CronductError::ShutDown),
            };
            shared.registry.register(task)?;
            shared.metrics.track(&id);
            running
        };

        if running {
            if let Err(e) = self.inner.schedule_recurring(&id, &trigger) {
                let mut shared = self.inner.shared.lock().await;
                let _ = shared.registry.unregister(&id);
                shared.metrics.forget(&id);
                return Err(e);
            }
        }

        info!(task = %id, ?trigger, "task registered");
        Ok(())
    }

    /// Removes a task and cancels its trigger. Dependents now see it as missing.
    pub async fn unregister(&self, task_id: &str) -> Result<(), CronductError> {
        {
            let mut shared = self.inner.shared.lock().await;
            shared.registry.unregister(task_id)?;
            shared.metrics.forget(task_id);
        }
        self.inner.engine.cancel(task_id);
        info!(task = %task_id, "task unregistered");
        Ok(())
    }

    /// Replaces the recurring trigger of a task. A pending retry keeps its due time.
    pub async fn reschedule(&self, task_id: &str, trigger: TriggerSpec) -> Result<(), CronductError> {
        let (previous, pending_retry) = {
            let mut shared = self.inner.shared.lock().await;
            let entry = shared.registry.get_mut(task_id)?;
            // a busy entry schedules its own retry once its callbacks return
            let pending_retry = match entry.state {
                TaskState::Retrying if !entry.busy => Some((entry.attempt, entry.retry_due)),
                _ => None,
            };
            (std::mem::replace(&mut entry.trigger, trigger.clone()), pending_retry)
        };

        if self.lifecycle() != Lifecycle::Running {
            return Ok(());
        }

        self.inner.engine.cancel(task_id);
        if let Err(e) = self.inner.schedule_recurring(task_id, &trigger) {
            warn!(task = %task_id, error = %e, "new trigger rejected; restoring previous one");
            if let Ok(entry) = self.inner.shared.lock().await.registry.get_mut(task_id) {
                entry.trigger = previous.clone();
            }
            if let Err(e) = self.inner.schedule_recurring(task_id, &previous) {
                error!(task = %task_id, error = %e, "could not restore previous trigger");
            }
            self.inner.restore_retry(task_id, pending_retry);
            return Err(e);
        }
        self.inner.restore_retry(task_id, pending_retry);

        info!(task = %task_id, ?trigger, "task rescheduled");
        Ok(())
    }

    /// Stops a task from starting new cycles. A retry already in progress completes.
    pub async fn pause(&self, task_id: &str) -> Result<(), CronductError> {
        self.inner.shared.lock().await.registry.get_mut(task_id)?.paused = true;
        self.inner.emit(&TaskEvent::Paused {
            task: task_id.to_string(),
        });
        Ok(())
    }

    pub async fn resume(&self, task_id: &str) -> Result<(), CronductError> {
        self.inner.shared.lock().await.registry.get_mut(task_id)?.paused = false;
        self.inner.emit(&TaskEvent::Resumed {
            task: task_id.to_string(),
        });
        Ok(())
    }

    /// Delivers a fire event for `task_id` now, as if its trigger had elapsed.
    ///
    /// Fires sent before [`start`](Self::start) are processed once the loop runs.
    pub async fn fire(&self, task_id: &str) -> Result<(), CronductError> {
        if matches!(self.lifecycle(), Lifecycle::Stopping | Lifecycle::Stopped) {
            return Err(CronductError::ShutDown);
        }
        if !self.inner.shared.lock().await.registry.contains(task_id) {
            return Err(CronductError::NotFound(task_id.to_string()));
        }
        if FireHandle::new(task_id, FireKind::Scheduled, self.inner.fire_tx.clone()).fire() {
            Ok(())
        } else {
            Err(CronductError::ShutDown)
        }
    }

    /// Schedules every registered trigger and starts the execution loop.
    ///
    /// With `blocking` the call returns only after the orchestrator has shut
    /// down, either through [`shutdown`](Self::shutdown) from another handle or,
    /// when `handle_signals` is set, on SIGINT/SIGTERM.
    pub async fn start(&self, blocking: bool) -> Result<(), CronductError> {
        let triggers: Vec<(String, TriggerSpec)> = {
            let mut shared = self.inner.shared.lock().await;

            let mut refused = None;
            self.inner.lifecycle.send_if_modified(|state| match state {
                Lifecycle::Idle => {
                    *state = Lifecycle::Running;
                    true
                }
                Lifecycle::Running | Lifecycle::Stopping => {
                    refused = Some(CronductError::AlreadyStarted);
                    false
                }
                Lifecycle::Stopped => {
                    refused = Some(CronductError::ShutDown);
                    false
                }
            });
            if let Some(e) = refused {
                return Err(e);
            }

            shared.metrics.mark_started(Utc::now());
            shared
                .registry
                .entries()
                .map(|(id, entry)| (id.clone(), entry.trigger.clone()))
                .collect()
        };

        for (i, (id, trigger)) in triggers.iter().enumerate() {
            if let Err(e) = self.inner.schedule_recurring(id, trigger) {
                error!(task = %id, error = %e, "could not schedule trigger; start aborted");
                for (scheduled, _) in &triggers[..i] {
                    self.inner.engine.cancel(scheduled);
                }
                self.inner.lifecycle.send_replace(Lifecycle::Idle);
                return Err(e);
            }
        }

        let Some(rx) = self.inner.fire_rx.lock().await.take() else {
            return Err(CronductError::AlreadyStarted);
        };
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), rx));
        *self.inner.loop_handle.lock().await = Some(handle);

        info!(
            tasks = triggers.len(),
            max_workers = self.inner.config.max_workers,
            "orchestrator started"
        );

        if blocking {
            self.block_until_shutdown().await;
        }
        Ok(())
    }

    async fn block_until_shutdown(&self) {
        let mut lifecycle = self.inner.lifecycle.subscribe();

        if self.inner.config.handle_signals {
            tokio::select! {
                _ = shutdown_signal() => {
                    info!("shutdown signal received");
                    self.shutdown(true).await;
                }
                _ = self.inner.accepting.cancelled() => {}
            }
        } else {
            self.inner.accepting.cancelled().await;
        }

        let _ = lifecycle.wait_for(|s| *s == Lifecycle::Stopped).await;
    }

    /// Stops accepting fires and cancels all triggers. With `wait`, running
    /// attempts get up to `shutdown_grace_period` to finish before they are
    /// cancelled. Pending retries are abandoned. Idempotent.
    pub async fn shutdown(&self, wait: bool) {
        let mut was = Lifecycle::Stopped;
        self.inner.lifecycle.send_if_modified(|state| {
            was = *state;
            match state {
                Lifecycle::Idle | Lifecycle::Running => {
                    *state = Lifecycle::Stopping;
                    true
                }
                Lifecycle::Stopping | Lifecycle::Stopped => false,
            }
        });
        if !matches!(was, Lifecycle::Idle | Lifecycle::Running) {
            if wait {
                let mut lifecycle = self.inner.lifecycle.subscribe();
                let _ = lifecycle.wait_for(|s| *s == Lifecycle::Stopped).await;
            }
            return;
        }

        self.inner.emit(&TaskEvent::ShutdownStarted);
        self.inner.accepting.cancel();
        self.inner.engine.cancel_all();
        // an orchestrator that never started still owns its receiver
        self.inner.fire_rx.lock().await.take();

        let handle = self.inner.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "execution loop ended abnormally");
            }
        }

        self.inner.tracker.close();
        let mut abandoned = 0;
        if wait {
            let grace = self.inner.config.shutdown_grace_period;
            if tokio::time::timeout(grace, self.inner.tracker.wait()).await.is_err() {
                abandoned = self.inner.tracker.len();
                warn!(
                    running = abandoned,
                    grace_ms = grace.as_millis() as u64,
                    "grace period elapsed; cancelling running attempts"
                );
                self.inner.attempts.cancel();
            }
        } else {
            abandoned = self.inner.tracker.len();
        }

        self.inner.emit(&TaskEvent::ShutdownCompleted { abandoned });
        self.inner.lifecycle.send_replace(Lifecycle::Stopped);
        info!("orchestrator shut down");
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    pub async fn get_state(&self, task_id: &str) -> Result<TaskState, CronductError> {
        self.inner.shared.lock().await.registry.get_state(task_id)
    }

    pub async fn get_metrics(&self, task_id: &str) -> Option<JobMetrics> {
        self.inner.shared.lock().await.metrics.get(task_id)
    }

    pub async fn get_all_metrics(&self) -> MetricsSnapshot {
        let shared = self.inner.shared.lock().await;
        let completed = shared.registry.count_in_state(TaskState::Success);
        shared.metrics.snapshot(self.is_running(), completed)
    }

    pub async fn task_ids(&self) -> Vec<String> {
        self.inner.shared.lock().await.registry.task_ids()
    }

    /// Dependency chains from every root task, one line per edge.
    pub async fn render_graph(&self) -> String {
        self.inner.shared.lock().await.registry.render_graph()
    }

    /// Lifecycle events in addition to the injected sink. Slow receivers lag.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.borrow()
    }
}

async fn run_loop(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<FireEvent>) {
    debug!("execution loop started");
    loop {
        tokio::select! {
            biased;
            _ = inner.accepting.cancelled() => break,
            fire = rx.recv() => match fire {
                Some(fire) => inner.handle_fire(fire).await,
                None => break,
            },
        }
    }
    rx.close();
    debug!("execution loop stopped");
}

impl EventSink for Inner {
    fn emit(&self, event: &TaskEvent) {
        self.sink.emit(event);
        // no subscribers is fine
        let _ = self.events.send(event.clone());
    }
}

impl Inner {
    fn schedule_recurring(&self, task_id: &str, trigger: &TriggerSpec) -> Result<(), CronductError> {
        let handle = FireHandle::new(task_id, FireKind::Scheduled, self.fire_tx.clone());
        self.engine.schedule_recurring(task_id, trigger, handle)
    }

    fn schedule_retry(&self, task_id: &str, attempt: u32, delay: Duration) {
        let handle = FireHandle::new(task_id, FireKind::Retry { attempt }, self.fire_tx.clone());
        if let Err(e) = self.engine.schedule_once(task_id, delay, handle) {
            error!(task = %task_id, attempt, error = %e, "could not schedule retry");
        }
    }

    fn restore_retry(&self, task_id: &str, pending: Option<(u32, Option<Instant>)>) {
        if let Some((attempt, due)) = pending {
            let delay = due.map_or(MAX_RETRY_DELAY, |due| {
                due.saturating_duration_since(Instant::now())
            });
            self.schedule_retry(task_id, attempt, delay);
        }
    }

    async fn handle_fire(self: &Arc<Self>, fire: FireEvent) {
        match fire.kind {
            FireKind::Scheduled => self.open_cycle(&fire.task_id).await,
            FireKind::Retry { attempt } => self.resume_cycle(&fire.task_id, attempt).await,
        }
    }

    async fn open_cycle(self: &Arc<Self>, id: &str) {
        let claim = {
            let mut shared = self.shared.lock().await;
            let Shared { registry, metrics } = &mut *shared;
            match registry.get_mut(id) {
                Err(_) => Claim::Unknown,
                Ok(entry) if entry.busy || entry.state.is_in_flight() => {
                    let state = entry.state;
                    metrics.record_misfire(id);
                    Claim::Misfire(state)
                }
                Ok(entry) if entry.paused => Claim::Paused,
                Ok(entry) => {
                    entry.busy = true;
                    entry.attempt = 1;
                    entry.cycle_elapsed = Duration::ZERO;
                    entry.retry_due = None;
                    let task = Arc::clone(&entry.task);
                    if let Err(e) = registry.set_state(id, TaskState::Pending) {
                        error!(task = %id, error = %e, "could not reset task");
                    }
                    Claim::Claimed(task)
                }
            }
        };

        let task = match claim {
            Claim::Claimed(task) => task,
            Claim::Unknown => {
                warn!(task = %id, "fire for unknown task dropped");
                return;
            }
            Claim::Paused => {
                debug!(task = %id, "task paused; fire dropped");
                return;
            }
            Claim::Misfire(state) => {
                self.emit(&TaskEvent::Misfired {
                    task: id.to_string(),
                    state,
                });
                return;
            }
        };

        self.emit(&TaskEvent::Fired {
            task: id.to_string(),
            retry_attempt: None,
        });

        // user code runs outside the lock
        let gate = ConditionalGate::check(&task);

        let verdict: Result<(), SkipReason> = {
            let mut shared = self.shared.lock().await;
            let Shared { registry, metrics } = &mut *shared;
            if !registry.get(id).is_ok_and(|entry| Arc::ptr_eq(&entry.task, &task)) {
                debug!(task = %id, "task unregistered during dispatch");
                return;
            }

            let verdict = match gate {
                Ok(()) => DependencyResolver::check(registry, id),
                Err(reason) => Err(reason),
            };
            let next = match verdict {
                Ok(()) => TaskState::Running,
                Err(_) => {
                    metrics.record_skip(id);
                    if let Ok(entry) = registry.get_mut(id) {
                        entry.busy = false;
                    }
                    TaskState::Skipped
                }
            };
            if let Err(e) = registry.set_state(id, next) {
                error!(task = %id, error = %e, "state transition rejected");
            }
            verdict
        };

        match verdict {
            Ok(()) => self.dispatch(task, 1),
            Err(reason) => self.emit(&TaskEvent::Skipped {
                task: id.to_string(),
                reason,
            }),
        }
    }

    async fn resume_cycle(self: &Arc<Self>, id: &str, attempt: u32) {
        let task = {
            let mut shared = self.shared.lock().await;
            let registry = &mut shared.registry;
            let Ok(entry) = registry.get_mut(id) else {
                debug!(task = %id, attempt, "retry fire for unknown task dropped");
                return;
            };
            if entry.state != TaskState::Retrying || entry.attempt != attempt || entry.busy {
                debug!(task = %id, attempt, state = %entry.state, "stale retry fire dropped");
                return;
            }
            entry.busy = true;
            entry.retry_due = None;
            let task = Arc::clone(&entry.task);
            if let Err(e) = registry.set_state(id, TaskState::Running) {
                error!(task = %id, error = %e, "state transition rejected");
            }
            task
        };

        self.emit(&TaskEvent::Fired {
            task: id.to_string(),
            retry_attempt: Some(attempt),
        });
        self.dispatch(task, attempt);
    }

    fn dispatch(self: &Arc<Self>, task: Arc<Task>, attempt: u32) {
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            inner.run_attempt(task, attempt).await;
        });
    }

    async fn run_attempt(self: Arc<Self>, task: Arc<Task>, attempt: u32) {
        let id = task.id();
        let Ok(_permit) = self.workers.acquire().await else {
            error!(task = %id, "worker pool closed; attempt dropped");
            return;
        };

        self.emit(&TaskEvent::Started {
            task: id.to_string(),
            attempt,
        });

        let mut input = task.input().clone();
        input.insert("attempt".to_string(), serde_json::json!(attempt));

        let started = Instant::now();
        let result = TimeoutEnforcer::new(task.timeout())
            .run(id, Arc::clone(task.action()), self.attempts.clone(), input)
            .await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(output) => ExecutionOutcome::Success(output),
            Err(error) => match RetryController::new(task.retry_policy().clone()).on_failure(attempt) {
                RetryDecision::Retry(delay) => ExecutionOutcome::RetryableFailure {
                    error,
                    attempt,
                    delay,
                },
                RetryDecision::FinalFailure => ExecutionOutcome::FinalFailure { error, attempt },
            },
        };

        self.commit(&task, &outcome, elapsed).await;

        CallbackDispatcher::new(&*self).dispatch(&task, &outcome);

        let retry = {
            let mut shared = self.shared.lock().await;
            match shared.registry.get_mut(id) {
                Ok(entry) if Arc::ptr_eq(&entry.task, &task) => {
                    entry.busy = false;
                    match &outcome {
                        ExecutionOutcome::RetryableFailure { attempt, delay, .. }
                            if !self.accepting.is_cancelled() =>
                        {
                            // `None` for a due time beyond the clock's range
                            entry.retry_due = Instant::now().checked_add(*delay);
                            Some((attempt + 1, *delay))
                        }
                        ExecutionOutcome::RetryableFailure { .. } => {
                            debug!(task = %id, "shutting down; retry abandoned");
                            None
                        }
                        _ => None,
                    }
                }
                _ => None,
            }
        };

        if let Some((next, delay)) = retry {
            self.schedule_retry(id, next, delay);
        }
    }

    /// Records the outcome in metrics and commits the state transition.
    ///
    /// Outcomes of a task that was unregistered meanwhile are dropped, also when
    /// a new task took over its id.
    async fn commit(&self, task: &Arc<Task>, outcome: &ExecutionOutcome, elapsed: Duration) {
        let id = task.id();
        let event = {
            let mut shared = self.shared.lock().await;
            let Shared { registry, metrics } = &mut *shared;
            let entry = match registry.get_mut(id) {
                Ok(entry) if Arc::ptr_eq(&entry.task, task) => entry,
                _ => {
                    debug!(task = %id, "task unregistered while running; outcome dropped");
                    return;
                }
            };
            entry.cycle_elapsed += elapsed;
            let cycle_time = entry.cycle_elapsed;

            let event = match outcome {
                ExecutionOutcome::Success(_) => {
                    entry.last_error = None;
                    metrics.record(id, RunOutcome::Success, cycle_time);
                    TaskEvent::Succeeded {
                        task: id.to_string(),
                        attempt: entry.attempt,
                        duration: cycle_time,
                    }
                }
                ExecutionOutcome::RetryableFailure { error, attempt, delay } => {
                    entry.last_error = Some(error.kind());
                    entry.attempt = attempt + 1;
                    metrics.record_retry(id, error.kind(), elapsed);
                    TaskEvent::RetryScheduled {
                        task: id.to_string(),
                        attempt: *attempt,
                        delay: *delay,
                        kind: error.kind(),
                        error: error.to_string(),
                    }
                }
                ExecutionOutcome::FinalFailure { error, attempt } => {
                    entry.last_error = Some(error.kind());
                    metrics.record(id, RunOutcome::Failure(error.kind()), cycle_time);
                    TaskEvent::Failed {
                        task: id.to_string(),
                        attempts: *attempt,
                        kind: error.kind(),
                        error: error.to_string(),
                    }
                }
                ExecutionOutcome::Skipped(reason) => {
                    metrics.record_skip(id);
                    TaskEvent::Skipped {
                        task: id.to_string(),
                        reason: reason.clone(),
                    }
                }
            };

            if let Err(e) = registry.set_state(id, outcome.state()) {
                error!(task = %id, error = %e, "state transition rejected");
            }
            event
        };

        self.emit(&event);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
