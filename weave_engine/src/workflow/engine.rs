//! Concurrent workflow scheduler.
//!
//! The [`WorkflowEngine`] admits workflows, drives each started workflow with
//! its own driver loop, and runs every dispatched task on its own tokio task.
//!
//! # Execution Model
//!
//! Each pass of a driver loop:
//! 1. Completes the workflow when every task is COMPLETED
//! 2. Fails the workflow when nothing is ready and nothing is running
//! 3. Dispatches ready tasks in declaration order while task slots are free
//! 4. Sleeps until a task finishes or the poll interval elapses
//!
//! Task slots and workflow slots are engine-wide semaphores. A task that
//! finds no free slot simply stays PENDING for the next pass.

use crate::config::{ConfigError, EngineConfig};
use crate::workflow::cancellation::CancellationTokenSource;
use crate::workflow::dag::{BlockedTask, Workflow, WorkflowError, WorkflowStatus};
use crate::workflow::events::{EventListener, EventNotifier, WorkflowEvent};
use crate::workflow::params::{self, ParameterError};
use crate::workflow::registry::{
    build_agent_query, AgentFallback, ExecutorRegistry, TaskContext, TaskError, TaskExecutor,
};
use crate::workflow::state::{TaskSummary, WorkflowSnapshot};
use crate::workflow::task::{Parameters, TaskId, TaskOutcome, TaskStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Mutex, Notify, OwnedSemaphorePermit, RwLock, Semaphore};

/// Error types for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Too many workflows are held by the engine
    #[error("Maximum concurrent workflows reached ({limit})")]
    CapacityExceeded { limit: usize },

    /// No workflow with this id
    #[error("Workflow not found: {0}")]
    NotFound(String),

    /// Operation is not allowed in the workflow's current status
    #[error("Workflow '{workflow_id}' is {status}, cannot {operation}")]
    InvalidState {
        workflow_id: String,
        status: WorkflowStatus,
        operation: &'static str,
    },

    /// A workflow with this id is already registered
    #[error("Workflow already exists: {0}")]
    AlreadyExists(String),

    /// Workflow structure is invalid
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(#[from] WorkflowError),
}

/// Why a running workflow can make no further progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeadlockError {
    blocked: Vec<BlockedTask>,
    exhausted: Vec<TaskId>,
}

impl DeadlockError {
    fn detect(workflow: &Workflow) -> Self {
        Self {
            blocked: workflow.blocked_tasks(),
            exhausted: workflow.exhausted_tasks().iter().map(|t| t.id.clone()).collect(),
        }
    }
}

impl fmt::Display for DeadlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.exhausted.is_empty() {
            parts.push(format!("tasks exhausted retries: {}", join_ids(&self.exhausted)));
        }
        if !self.blocked.is_empty() {
            let blocked: Vec<String> = self
                .blocked
                .iter()
                .map(|b| format!("{} waiting on {}", b.task_id, join_ids(&b.unresolved)))
                .collect();
            parts.push(format!("blocked tasks: {}", blocked.join("; ")));
        }
        if parts.is_empty() {
            parts.push("no runnable tasks remain".to_string());
        }
        write!(f, "Workflow deadlocked: {}", parts.join("; "))
    }
}

impl std::error::Error for DeadlockError {}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(TaskId::as_str).collect::<Vec<_>>().join(", ")
}

/// Point-in-time engine counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Created or running workflows
    pub active_workflows: usize,
    /// Workflows in a terminal state
    pub finished_workflows: usize,
    /// Executor calls currently holding a task slot
    pub running_tasks: usize,
    pub available_task_slots: usize,
    pub max_concurrent_tasks: usize,
    pub max_concurrent_workflows: usize,
    /// Workflow counts keyed by status name
    pub workflows_by_status: HashMap<String, usize>,
}

/// Engine-side state of one registered workflow.
struct WorkflowHandle {
    workflow: Mutex<Workflow>,
    cancellation: CancellationTokenSource,
    status: watch::Sender<WorkflowStatus>,
}

impl WorkflowHandle {
    fn new(workflow: Workflow) -> Self {
        let (status, _) = watch::channel(workflow.status);
        Self {
            workflow: Mutex::new(workflow),
            cancellation: CancellationTokenSource::new(),
            status,
        }
    }
}

#[derive(Default)]
struct Tables {
    active: HashMap<String, Arc<WorkflowHandle>>,
    finished: HashMap<String, Arc<WorkflowHandle>>,
}

/// Everything a dispatched task needs after the workflow lock is released.
struct Dispatch {
    task_id: TaskId,
    agent_type: String,
    action: String,
    parameters: Result<Parameters, ParameterError>,
    context: TaskContext,
    timeout: Duration,
}

enum Route {
    Executor(Arc<dyn TaskExecutor>),
    Fallback(Arc<dyn AgentFallback>, String),
}

struct EngineInner {
    config: EngineConfig,
    registry: ExecutorRegistry,
    fallback: Option<Arc<dyn AgentFallback>>,
    notifier: EventNotifier,
    tables: RwLock<Tables>,
    task_slots: Arc<Semaphore>,
    /// Bounds live driver loops. `create` already caps active workflows, so
    /// this only waits while a finished driver has not yet exited.
    workflow_slots: Arc<Semaphore>,
    completion: Notify,
    running_tasks: AtomicUsize,
}

/// Builder for [`WorkflowEngine`].
///
/// # Example
///
/// ```ignore
/// let engine = WorkflowEngine::builder(EngineConfig::default())
///     .with_registry(registry)
///     .add_listener(Arc::new(log.clone()))
///     .build()?;
/// ```
pub struct WorkflowEngineBuilder {
    config: EngineConfig,
    registry: ExecutorRegistry,
    fallback: Option<Arc<dyn AgentFallback>>,
    notifier: EventNotifier,
}

impl WorkflowEngineBuilder {
    /// Sets the executor registry.
    pub fn with_registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the agent fallback used when no executor is registered.
    pub fn with_fallback(mut self, fallback: Arc<dyn AgentFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Appends an event listener.
    pub fn add_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.notifier.add_listener(listener);
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> Result<WorkflowEngine, ConfigError> {
        self.config.validate()?;
        let inner = EngineInner {
            task_slots: Arc::new(Semaphore::new(self.config.max_concurrent_tasks)),
            workflow_slots: Arc::new(Semaphore::new(self.config.max_concurrent_workflows)),
            config: self.config,
            registry: self.registry,
            fallback: self.fallback,
            notifier: self.notifier,
            tables: RwLock::new(Tables::default()),
            completion: Notify::new(),
            running_tasks: AtomicUsize::new(0),
        };
        Ok(WorkflowEngine {
            inner: Arc::new(inner),
        })
    }
}

/// Dependency-aware concurrent workflow scheduler.
///
/// Cloning the engine yields another handle to the same state.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("fallback", &self.inner.fallback.is_some())
            .field("notifier", &self.inner.notifier)
            .finish()
    }
}

impl WorkflowEngine {
    /// Starts building an engine.
    pub fn builder(config: EngineConfig) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder {
            config,
            registry: ExecutorRegistry::new(),
            fallback: None,
            notifier: EventNotifier::new(),
        }
    }

    /// Creates an engine with a registry and no fallback or listeners.
    pub fn new(config: EngineConfig, registry: ExecutorRegistry) -> Result<Self, ConfigError> {
        Self::builder(config).with_registry(registry).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Registers a workflow in CREATED state and returns its id.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidWorkflow` - Empty, duplicate task ids, a cycle, or
    ///   a `$from` reference to a task that is not a dependency
    /// - `EngineError::InvalidState` - Workflow is not in CREATED state
    /// - `EngineError::CapacityExceeded` - Too many created or running workflows
    /// - `EngineError::AlreadyExists` - Workflow id is already registered
    pub async fn create(&self, workflow: Workflow) -> Result<String, EngineError> {
        workflow.validate()?;
        if workflow.status != WorkflowStatus::Created {
            return Err(EngineError::InvalidState {
                workflow_id: workflow.id.clone(),
                status: workflow.status,
                operation: "create",
            });
        }
        for (task_id, dependency) in workflow.unknown_dependencies() {
            tracing::warn!(
                workflow_id = %workflow.id,
                task_id = %task_id,
                dependency = %dependency,
                "Task depends on an unknown task and will never become ready"
            );
        }

        let id = workflow.id.clone();
        let snapshot = WorkflowSnapshot::capture(&workflow);
        {
            let mut tables = self.inner.tables.write().await;
            let limit = self.inner.config.max_concurrent_workflows;
            if tables.active.len() >= limit {
                tracing::warn!(workflow_id = %id, limit, "Workflow rejected, engine at capacity");
                return Err(EngineError::CapacityExceeded { limit });
            }
            if tables.active.contains_key(&id) || tables.finished.contains_key(&id) {
                return Err(EngineError::AlreadyExists(id));
            }
            tables
                .active
                .insert(id.clone(), Arc::new(WorkflowHandle::new(workflow)));
        }

        tracing::info!(
            workflow_id = %id,
            name = %snapshot.name,
            tasks = snapshot.progress.total,
            "Workflow created"
        );
        self.inner
            .notifier
            .notify(WorkflowEvent::WorkflowCreated, &snapshot, None);
        Ok(id)
    }

    /// Moves a CREATED workflow to RUNNING and spawns its driver loop.
    pub async fn start(&self, workflow_id: &str) -> Result<(), EngineError> {
        let handle = self.inner.handle(workflow_id).await?;
        {
            let mut workflow = handle.workflow.lock().await;
            if workflow.status != WorkflowStatus::Created {
                return Err(EngineError::InvalidState {
                    workflow_id: workflow_id.to_string(),
                    status: workflow.status,
                    operation: "start",
                });
            }
            workflow.status = WorkflowStatus::Running;
            workflow.started_at = Some(Utc::now());
            handle.status.send_replace(WorkflowStatus::Running);

            tracing::info!(workflow_id = %workflow_id, "Workflow started");
            let snapshot = WorkflowSnapshot::capture(&workflow);
            self.inner
                .notifier
                .notify(WorkflowEvent::WorkflowStarted, &snapshot, None);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.drive(handle).await });
        Ok(())
    }

    /// Creates and starts a workflow in one call.
    pub async fn submit(&self, workflow: Workflow) -> Result<String, EngineError> {
        let id = self.create(workflow).await?;
        self.start(&id).await?;
        Ok(id)
    }

    /// Cancels a created or running workflow.
    ///
    /// Running tasks are marked CANCELLED and the workflow's cancellation
    /// token fires. Executors are not awaited; their late results are dropped.
    pub async fn cancel(&self, workflow_id: &str) -> Result<(), EngineError> {
        let handle = self.inner.handle(workflow_id).await?;
        let mut workflow = handle.workflow.lock().await;
        if workflow.status.is_terminal() {
            return Err(EngineError::InvalidState {
                workflow_id: workflow_id.to_string(),
                status: workflow.status,
                operation: "cancel",
            });
        }

        let now = Utc::now();
        for task in workflow
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Running)
        {
            task.mark_cancelled();
        }
        workflow.status = WorkflowStatus::Cancelled;
        workflow.completed_at = Some(now);
        handle.cancellation.cancel();

        tracing::info!(workflow_id = %workflow_id, "Workflow cancelled");
        self.inner
            .finish(workflow_id, &handle, &workflow, WorkflowEvent::WorkflowCancelled)
            .await;
        drop(workflow);
        self.inner.completion.notify_waiters();
        Ok(())
    }

    /// Returns a snapshot of a workflow, active or finished.
    pub async fn status(&self, workflow_id: &str) -> Option<WorkflowSnapshot> {
        let handle = self.inner.handle(workflow_id).await.ok()?;
        let workflow = handle.workflow.lock().await;
        Some(WorkflowSnapshot::capture(&workflow))
    }

    /// Lists workflows ordered by creation time, optionally by status.
    pub async fn list(&self, status: Option<WorkflowStatus>) -> Vec<WorkflowSnapshot> {
        let mut snapshots = Vec::new();
        for handle in self.inner.all_handles().await {
            let workflow = handle.workflow.lock().await;
            if status.is_none_or(|s| workflow.status == s) {
                snapshots.push(WorkflowSnapshot::capture(&workflow));
            }
        }
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    /// Returns a copy of the workflow's shared context.
    pub async fn context(&self, workflow_id: &str) -> Option<Map<String, Value>> {
        let handle = self.inner.handle(workflow_id).await.ok()?;
        let workflow = handle.workflow.lock().await;
        Some(workflow.context.clone())
    }

    /// Waits until the workflow reaches a terminal status.
    pub async fn wait(&self, workflow_id: &str) -> Result<WorkflowSnapshot, EngineError> {
        let handle = self.inner.handle(workflow_id).await?;
        let mut status = handle.status.subscribe();
        // The sender lives in the handle, so the channel cannot close here.
        let _ = status.wait_for(|s| s.is_terminal()).await;
        let workflow = handle.workflow.lock().await;
        Ok(WorkflowSnapshot::capture(&workflow))
    }

    /// Cancels every active workflow.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.inner.tables.read().await.active.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.cancel(&id).await {
                tracing::debug!(workflow_id = %id, error = %e, "Skipped during shutdown");
            }
        }
        tracing::info!("Workflow engine shutdown completed");
    }

    /// Returns engine counters.
    pub async fn stats(&self) -> EngineStats {
        let (active, finished) = {
            let tables = self.inner.tables.read().await;
            (tables.active.len(), tables.finished.len())
        };
        let mut workflows_by_status = HashMap::new();
        for handle in self.inner.all_handles().await {
            let status = handle.workflow.lock().await.status;
            *workflows_by_status
                .entry(status.as_str().to_string())
                .or_insert(0) += 1;
        }
        EngineStats {
            active_workflows: active,
            finished_workflows: finished,
            running_tasks: self.inner.running_tasks.load(Ordering::SeqCst),
            available_task_slots: self.inner.task_slots.available_permits(),
            max_concurrent_tasks: self.inner.config.max_concurrent_tasks,
            max_concurrent_workflows: self.inner.config.max_concurrent_workflows,
            workflows_by_status,
        }
    }
}

impl EngineInner {
    async fn handle(&self, workflow_id: &str) -> Result<Arc<WorkflowHandle>, EngineError> {
        let tables = self.tables.read().await;
        tables
            .active
            .get(workflow_id)
            .or_else(|| tables.finished.get(workflow_id))
            .cloned()
            .ok_or_else(|| EngineError::NotFound(workflow_id.to_string()))
    }

    async fn all_handles(&self) -> Vec<Arc<WorkflowHandle>> {
        let tables = self.tables.read().await;
        tables
            .active
            .values()
            .chain(tables.finished.values())
            .cloned()
            .collect()
    }

    /// Moves a workflow that just turned terminal into the finished table.
    ///
    /// Called with the workflow lock held; the tables lock is always taken
    /// after a workflow lock, never before.
    async fn finish(
        &self,
        workflow_id: &str,
        handle: &Arc<WorkflowHandle>,
        workflow: &Workflow,
        event: WorkflowEvent,
    ) {
        {
            let mut tables = self.tables.write().await;
            if let Some(handle) = tables.active.remove(workflow_id) {
                tables.finished.insert(workflow_id.to_string(), handle);
            }
        }
        let snapshot = WorkflowSnapshot::capture(workflow);
        self.notifier.notify(event, &snapshot, None);
        handle.status.send_replace(workflow.status);
    }

    async fn drive(self: Arc<Self>, handle: Arc<WorkflowHandle>) {
        let token = handle.cancellation.token();
        let _slot = tokio::select! {
            permit = self.workflow_slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = token.cancelled() => return,
        };

        loop {
            let notified = self.completion.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pass(&handle).await {
                break;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
    }

    /// Runs one scheduling pass. Returns true once the workflow is terminal.
    async fn pass(self: &Arc<Self>, handle: &Arc<WorkflowHandle>) -> bool {
        let mut workflow = handle.workflow.lock().await;
        if workflow.status != WorkflowStatus::Running {
            return true;
        }
        let workflow_id = workflow.id.clone();

        if workflow.is_complete() {
            workflow.status = WorkflowStatus::Completed;
            workflow.completed_at = Some(Utc::now());
            tracing::info!(workflow_id = %workflow_id, "Workflow completed");
            self.finish(&workflow_id, handle, &workflow, WorkflowEvent::WorkflowCompleted)
                .await;
            return true;
        }

        let ready = workflow.ready_tasks();
        if ready.is_empty() && !workflow.has_running() {
            let reason = DeadlockError::detect(&workflow).to_string();
            tracing::warn!(workflow_id = %workflow_id, reason = %reason, "Workflow failed");
            workflow.status = WorkflowStatus::Failed;
            workflow.completed_at = Some(Utc::now());
            workflow
                .metadata
                .insert("error".to_string(), Value::String(reason));
            self.finish(&workflow_id, handle, &workflow, WorkflowEvent::WorkflowFailed)
                .await;
            return true;
        }

        for idx in ready {
            let Ok(permit) = self.task_slots.clone().try_acquire_owned() else {
                tracing::debug!(
                    workflow_id = %workflow_id,
                    task_id = %workflow.tasks[idx].id,
                    "No free task slot, deferring"
                );
                break;
            };

            let parameters = params::resolve(&workflow.tasks[idx].parameters, &workflow.context);
            let context_snapshot = workflow.context.clone();
            let task = &mut workflow.tasks[idx];
            task.mark_running();

            let dispatch = Dispatch {
                task_id: task.id.clone(),
                agent_type: task.agent_type.clone(),
                action: task.action.clone(),
                parameters,
                context: TaskContext::new(workflow_id.clone(), task.id.clone())
                    .with_context(context_snapshot)
                    .with_attempt(task.retry_count)
                    .with_cancellation_token(handle.cancellation.token()),
                timeout: task.timeout,
            };
            let summary = TaskSummary::from(&*task);

            tracing::debug!(
                workflow_id = %workflow_id,
                task_id = %dispatch.task_id,
                attempt = dispatch.context.attempt,
                "Dispatching task"
            );
            let snapshot = WorkflowSnapshot::capture(&workflow);
            self.notifier
                .notify(WorkflowEvent::TaskStarted, &snapshot, Some(&summary));

            self.running_tasks.fetch_add(1, Ordering::SeqCst);
            let inner = self.clone();
            let handle = handle.clone();
            tokio::spawn(async move { inner.run_task(handle, dispatch, permit).await });
        }
        false
    }

    async fn run_task(
        self: Arc<Self>,
        handle: Arc<WorkflowHandle>,
        dispatch: Dispatch,
        permit: OwnedSemaphorePermit,
    ) {
        let started = Instant::now();
        let task_id = dispatch.task_id.clone();
        let workflow_id = dispatch.context.workflow_id.clone();
        let token = handle.cancellation.token();

        // A cancelled workflow gives its slot back at once; the executor call
        // is detached like a timed-out one.
        tokio::select! {
            result = self.invoke(dispatch) => {
                self.record(&handle, &task_id, result, started.elapsed()).await;
            }
            _ = token.cancelled() => {
                tracing::debug!(
                    workflow_id = %workflow_id,
                    task_id = %task_id,
                    "Releasing slot of a cancelled task"
                );
            }
        }

        drop(permit);
        self.running_tasks.fetch_sub(1, Ordering::SeqCst);
        self.completion.notify_waiters();
    }

    fn route(&self, agent_type: &str, action: &str, parameters: &Parameters) -> Result<Route, TaskError> {
        if let Some(executor) = self.registry.get(agent_type, action) {
            return Ok(Route::Executor(executor));
        }
        match &self.fallback {
            Some(fallback) if fallback.has_capability(agent_type) => Ok(Route::Fallback(
                fallback.clone(),
                build_agent_query(action, parameters),
            )),
            _ => Err(TaskError::NoExecutor {
                agent_type: agent_type.to_string(),
                action: action.to_string(),
            }),
        }
    }

    /// Calls the executor on a separate tokio task, bounded by the timeout.
    ///
    /// On timeout the call is detached and keeps running in the background.
    async fn invoke(&self, dispatch: Dispatch) -> Result<Value, TaskError> {
        let parameters = dispatch.parameters?;
        let route = self.route(&dispatch.agent_type, &dispatch.action, &parameters)?;
        let context = dispatch.context;

        let call = tokio::spawn(async move {
            match route {
                Route::Executor(executor) => executor.execute(parameters, context).await,
                Route::Fallback(fallback, query) => fallback.handle(&query, &parameters).await,
            }
        });

        match tokio::time::timeout(dispatch.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(TaskError::Execution(format!(
                "executor aborted: {}",
                join_error
            ))),
            Err(_) => Err(TaskError::Timeout {
                task_id: dispatch.task_id,
                timeout: dispatch.timeout,
            }),
        }
    }

    async fn record(
        &self,
        handle: &Arc<WorkflowHandle>,
        task_id: &TaskId,
        result: Result<Value, TaskError>,
        elapsed: Duration,
    ) {
        let mut workflow = handle.workflow.lock().await;
        let workflow_id = workflow.id.clone();
        let Some(idx) = workflow.tasks.iter().position(|t| &t.id == task_id) else {
            return;
        };
        if workflow.status != WorkflowStatus::Running
            || workflow.tasks[idx].status != TaskStatus::Running
        {
            tracing::debug!(
                workflow_id = %workflow_id,
                task_id = %task_id,
                "Discarding result of a cancelled task"
            );
            return;
        }

        match result {
            Ok(output) => {
                workflow
                    .context
                    .insert(task_id.to_string(), output.clone());
                workflow.tasks[idx].mark_completed(TaskOutcome::success(output, elapsed));
                tracing::info!(
                    workflow_id = %workflow_id,
                    task_id = %task_id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Task completed"
                );
                let summary = TaskSummary::from(&workflow.tasks[idx]);
                let snapshot = WorkflowSnapshot::capture(&workflow);
                self.notifier
                    .notify(WorkflowEvent::TaskCompleted, &snapshot, Some(&summary));
            }
            Err(error) => {
                let outcome = TaskOutcome::failure(error.kind(), error.to_string(), elapsed);
                let retry = workflow.tasks[idx].mark_failed(outcome);
                let task = &workflow.tasks[idx];
                tracing::warn!(
                    workflow_id = %workflow_id,
                    task_id = %task_id,
                    attempt = task.retry_count + 1,
                    max_retries = task.max_retries,
                    will_retry = retry,
                    error = %error,
                    "Task failed"
                );
                let summary = TaskSummary::from(task);
                let snapshot = WorkflowSnapshot::capture(&workflow);
                self.notifier
                    .notify(WorkflowEvent::TaskFailed, &snapshot, Some(&summary));
                if retry {
                    workflow.tasks[idx].requeue();
                }
            }
        }
    }
}
