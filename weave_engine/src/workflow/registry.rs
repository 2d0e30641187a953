//! Executor registry and the collaborator traits the engine calls into.
//!
//! Tasks are routed by their `(agent_type, action)` pair to a registered
//! [`TaskExecutor`]. When no executor matches, the engine asks the optional
//! [`AgentFallback`] whether it can serve the agent type and hands it a
//! synthetic natural-language query.

use crate::workflow::cancellation::CancellationToken;
use crate::workflow::params::ParameterError;
use crate::workflow::task::{Parameters, TaskErrorKind, TaskId};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error types for task execution.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Executor reported a failure
    #[error("Task execution failed: {0}")]
    Execution(String),

    /// Executor call exceeded the task timeout
    #[error("Task '{task_id}' exceeded timeout limit of {timeout:?}")]
    Timeout { task_id: TaskId, timeout: Duration },

    /// Neither a registered executor nor a fallback can run the task
    #[error("No executor registered for {agent_type}:{action}")]
    NoExecutor { agent_type: String, action: String },

    /// Parameters could not be resolved from the workflow context
    #[error("Parameter resolution failed: {0}")]
    Parameter(#[from] ParameterError),

    /// Generic error wrapper
    #[error("Task error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    /// Classifies the error for retry decisions and reporting.
    pub fn kind(&self) -> TaskErrorKind {
        match self {
            TaskError::Execution(_) => TaskErrorKind::Execution,
            TaskError::Timeout { .. } => TaskErrorKind::Timeout,
            TaskError::NoExecutor { .. } => TaskErrorKind::NoExecutor,
            TaskError::Parameter(_) => TaskErrorKind::Parameter,
            TaskError::Other(_) => TaskErrorKind::Other,
        }
    }
}

/// Execution context provided to executors.
///
/// Carries an owned snapshot of the workflow context taken by the driver loop
/// after every dependency was observed COMPLETED, plus the workflow's
/// cancellation token.
#[derive(Clone, Debug)]
pub struct TaskContext {
    /// Workflow identifier for this execution
    pub workflow_id: String,
    /// Task identifier for this execution
    pub task_id: TaskId,
    /// Outputs of tasks completed before dispatch, keyed by task id
    pub context: Map<String, Value>,
    /// 0 for the first attempt
    pub attempt: u32,
    cancellation_token: CancellationToken,
}

impl TaskContext {
    /// Creates a new TaskContext.
    pub fn new(workflow_id: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            task_id,
            context: Map::new(),
            attempt: 0,
            cancellation_token: CancellationToken::default(),
        }
    }

    /// Sets the context snapshot.
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Sets the attempt number.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Sets the cancellation token for cooperative cancellation.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Returns the token executors may check or await.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Output of an earlier task, if recorded.
    pub fn output(&self, task_id: &str) -> Option<&Value> {
        self.context.get(task_id)
    }
}

/// Capability that performs a task's actual work.
///
/// Executors may be invoked more than once for the same task when retries
/// are configured; the engine does not deduplicate side effects.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes the task with its resolved parameters.
    async fn execute(&self, parameters: Parameters, context: TaskContext) -> Result<Value, TaskError>;
}

/// Adapter turning an async closure into a [`TaskExecutor`].
///
/// # Example
///
/// ```ignore
/// let executor = FnExecutor::new(|params, _ctx| async move {
///     Ok(json!({ "echo": params }))
/// });
/// ```
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(Parameters, TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send,
{
    async fn execute(&self, parameters: Parameters, context: TaskContext) -> Result<Value, TaskError> {
        (self.f)(parameters, context).await
    }
}

/// Generic capability lookup used when no executor is registered.
#[async_trait]
pub trait AgentFallback: Send + Sync {
    /// Returns true if an agent of this type is available.
    fn has_capability(&self, agent_type: &str) -> bool;

    /// Handles a synthetic natural-language query.
    async fn handle(&self, query: &str, parameters: &Parameters) -> Result<Value, TaskError>;
}

/// Registry mapping `(agent_type, action)` to executors.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<(String, String), Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor, replacing any previous one for the same key.
    pub fn register(
        &mut self,
        agent_type: impl Into<String>,
        action: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
    ) {
        let key = (agent_type.into(), action.into());
        tracing::debug!(agent_type = %key.0, action = %key.1, "Registered task executor");
        self.executors.insert(key, executor);
    }

    /// Registers an async closure as an executor.
    pub fn register_fn<F, Fut>(&mut self, agent_type: impl Into<String>, action: impl Into<String>, f: F)
    where
        F: Fn(Parameters, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        self.register(agent_type, action, Arc::new(FnExecutor::new(f)));
    }

    /// Looks up the executor for a routing key.
    pub fn get(&self, agent_type: &str, action: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors
            .get(&(agent_type.to_string(), action.to_string()))
            .cloned()
    }

    /// Returns true if an executor is registered for the key.
    pub fn contains(&self, agent_type: &str, action: &str) -> bool {
        self.executors
            .contains_key(&(agent_type.to_string(), action.to_string()))
    }

    /// Registered keys formatted as `agent_type:action`, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .executors
            .keys()
            .map(|(agent, action)| format!("{}:{}", agent, action))
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.keys())
            .finish()
    }
}

/// Builds the query handed to an [`AgentFallback`].
///
/// Known actions use a phrase template filled from string parameters; if the
/// template needs a parameter that is absent, or the action is unknown, the
/// query lists the action and the parameters as JSON.
pub fn build_agent_query(action: &str, parameters: &Parameters) -> String {
    let template: Option<(&str, &[&str])> = match action {
        "search" => Some(("Search for: {query}", &["query"][..])),
        "analyze" => Some(("Analyze: {content}", &["content"][..])),
        "summarize" => Some(("Summarize: {content}", &["content"][..])),
        "extract" => Some(("Extract information from: {source}", &["source"][..])),
        "generate" => Some(("Generate: {type} for {topic}", &["type", "topic"][..])),
        "check" => Some(("Check {type}: {content}", &["type", "content"][..])),
        "review" => Some(("Review {type}: {content}", &["type", "content"][..])),
        _ => None,
    };

    let params_json = Value::Object(parameters.clone()).to_string();

    let Some((template, keys)) = template else {
        return format!("Perform {} with parameters: {}", action, params_json);
    };

    let mut query = template.to_string();
    for key in keys {
        match parameters.get(*key) {
            Some(value) => {
                let text = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                query = query.replace(&format!("{{{}}}", key), &text);
            }
            None => return format!("Perform {}: {}", action, params_json),
        }
    }
    query
}
