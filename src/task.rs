use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{AttemptError, BoxError, RetryPolicy, TaskInput, TaskResult, TriggerSpec, ValidationError};

/// The unit of work a task performs on each attempt.
///
/// `ctx` is cancelled when the attempt times out or the orchestrator gives up
/// waiting for it during shutdown. Actions that loop or wait should watch it.
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(
        &self,
        ctx: CancellationToken,
        input: &TaskInput,
    ) -> Result<TaskResult, BoxError>;
}

type BoxedActionFn =
    Box<dyn Fn(CancellationToken, TaskInput) -> BoxFuture<'static, Result<TaskResult, BoxError>> + Send + Sync>;

/// Adapts an async closure into an [`Action`].
pub struct FnAction {
    f: BoxedActionFn,
}

impl FnAction {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken, TaskInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult, BoxError>> + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx, input| f(ctx, input).boxed()),
        }
    }
}

#[async_trait]
impl Action for FnAction {
    async fn execute(
        &self,
        ctx: CancellationToken,
        input: &TaskInput,
    ) -> Result<TaskResult, BoxError> {
        (self.f)(ctx, input.clone()).await
    }
}

/// Runs a synchronous closure on tokio's blocking pool.
///
/// A timed-out blocking attempt is abandoned, not interrupted: the closure keeps
/// its blocking thread until it returns on its own.
pub struct BlockingAction {
    f: Arc<dyn Fn(TaskInput) -> Result<TaskResult, BoxError> + Send + Sync>,
}

impl BlockingAction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(TaskInput) -> Result<TaskResult, BoxError> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl Action for BlockingAction {
    async fn execute(
        &self,
        _ctx: CancellationToken,
        input: &TaskInput,
    ) -> Result<TaskResult, BoxError> {
        let f = Arc::clone(&self.f);
        let input = input.clone();

        match tokio::task::spawn_blocking(move || f(input)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decides whether a fired task should run at all.
pub trait Condition: Send + Sync {
    fn evaluate(&self) -> Result<bool, BoxError>;
}

impl<F> Condition for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn evaluate(&self) -> Result<bool, BoxError> {
        Ok(self())
    }
}

pub trait SuccessHook: Send + Sync {
    fn on_success(&self, result: &TaskResult) -> Result<(), BoxError>;
}

impl<F> SuccessHook for F
where
    F: Fn(&TaskResult) -> Result<(), BoxError> + Send + Sync,
{
    fn on_success(&self, result: &TaskResult) -> Result<(), BoxError> {
        self(result)
    }
}

pub trait FailureHook: Send + Sync {
    fn on_failure(&self, error: &AttemptError) -> Result<(), BoxError>;
}

impl<F> FailureHook for F
where
    F: Fn(&AttemptError) -> Result<(), BoxError> + Send + Sync,
{
    fn on_failure(&self, error: &AttemptError) -> Result<(), BoxError> {
        self(error)
    }
}

pub trait RetryHook: Send + Sync {
    fn on_retry(&self, error: &AttemptError, attempt: u32) -> Result<(), BoxError>;
}

impl<F> RetryHook for F
where
    F: Fn(&AttemptError, u32) -> Result<(), BoxError> + Send + Sync,
{
    fn on_retry(&self, error: &AttemptError, attempt: u32) -> Result<(), BoxError> {
        self(error, attempt)
    }
}

#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) on_success: Option<Arc<dyn SuccessHook>>,
    pub(crate) on_failure: Option<Arc<dyn FailureHook>>,
    pub(crate) on_retry: Option<Arc<dyn RetryHook>>,
}

/// An immutable task definition. Build one with [`Task::builder`].
#[derive(Clone)]
pub struct Task {
    id: String,
    action: Arc<dyn Action>,
    trigger: TriggerSpec,
    retry_policy: RetryPolicy,
    timeout: Option<Duration>,
    dependencies: BTreeSet<String>,
    condition: Option<Arc<dyn Condition>>,
    pub(crate) hooks: Hooks,
    input: TaskInput,
}

impl Task {
    pub fn builder(id: impl Into<String>, action: impl Action + 'static) -> TaskBuilder {
        TaskBuilder::new(id, Arc::new(action))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    pub fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn condition(&self) -> Option<&Arc<dyn Condition>> {
        self.condition.as_ref()
    }

    pub fn input(&self) -> &TaskInput {
        &self.input
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("retry_policy", &self.retry_policy)
            .field("timeout", &self.timeout)
            .field("dependencies", &self.dependencies)
            .field("has_condition", &self.condition.is_some())
            .finish_non_exhaustive()
    }
}

pub struct TaskBuilder {
    id: String,
    action: Arc<dyn Action>,
    trigger: TriggerSpec,
    retry_policy: RetryPolicy,
    timeout: Option<Duration>,
    dependencies: BTreeSet<String>,
    condition: Option<Arc<dyn Condition>>,
    hooks: Hooks,
    input: TaskInput,
}

impl TaskBuilder {
    pub fn new(id: impl Into<String>, action: Arc<dyn Action>) -> Self {
        Self {
            id: id.into(),
            action,
            trigger: TriggerSpec::Manual,
            retry_policy: RetryPolicy::default(),
            timeout: None,
            dependencies: BTreeSet::new(),
            condition: None,
            hooks: Hooks::default(),
            input: TaskInput::new(),
        }
    }

    pub fn trigger(mut self, trigger: TriggerSpec) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry_policy.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, base: Duration) -> Self {
        self.retry_policy.base_delay = base;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.retry_policy.multiplier = multiplier;
        self
    }

    pub fn max_retry_delay(mut self, cap: Duration) -> Self {
        self.retry_policy.max_delay = Some(cap);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn condition<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(predicate));
        self
    }

    pub fn condition_with(mut self, condition: Arc<dyn Condition>) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskResult) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AttemptError) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks.on_failure = Some(Arc::new(hook));
        self
    }

    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AttemptError, u32) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<Task, ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.dependencies.contains(&self.id) {
            return Err(ValidationError::SelfDependency(self.id));
        }
        self.retry_policy.validate()?;
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ValidationError::InvalidPolicy(format!(
                "timeout of task '{}' must be positive",
                self.id
            )));
        }

        Ok(Task {
            id: self.id,
            action: self.action,
            trigger: self.trigger,
            retry_policy: self.retry_policy,
            timeout: self.timeout,
            dependencies: self.dependencies,
            condition: self.condition,
            hooks: self.hooks,
            input: self.input,
        })
    }
}
