//! Task data model for the workflow scheduler.
//!
//! A [`Task`] is pure data plus status: identity, the executor family it is
//! routed to, its dependencies, and its execution bookkeeping. Tasks are
//! mutated only by the [`WorkflowEngine`](crate::workflow::engine::WorkflowEngine).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Opaque key-value parameters handed to an executor.
pub type Parameters = Map<String, Value>;

/// Default wall-clock budget of a single executor call.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique identifier for a workflow task.
///
/// TaskId wraps a string identifier and implements the necessary traits
/// for use as a HashMap key and graph node identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the TaskId and returns the underlying string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of an individual task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or a free slot
    Pending,
    /// Executor call in flight
    Running,
    /// Executor returned a result
    Completed,
    /// Last attempt failed
    Failed,
    /// Owning workflow was cancelled while the task was running
    Cancelled,
}

impl TaskStatus {
    /// Returns the lowercase wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a task failure.
///
/// Deterministic kinds recur identically on retry, so a repeat occurrence
/// ends the retry loop early.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    Execution,
    Timeout,
    NoExecutor,
    Parameter,
    Other,
}

impl TaskErrorKind {
    /// Returns true if retrying cannot change the outcome.
    pub fn is_deterministic(&self) -> bool {
        matches!(self, TaskErrorKind::NoExecutor | TaskErrorKind::Parameter)
    }
}

/// Outcome recorded when a task leaves the RUNNING state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Executor payload on success
    pub output: Option<Value>,
    /// Error string on failure
    pub error: Option<String>,
    /// Failure classification
    pub error_kind: Option<TaskErrorKind>,
    /// Wall-clock time of the attempt
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// When the outcome was recorded
    pub recorded_at: DateTime<Utc>,
}

impl TaskOutcome {
    /// Creates a successful outcome.
    pub fn success(output: Value, duration: Duration) -> Self {
        Self {
            output: Some(output),
            error: None,
            error_kind: None,
            duration,
            recorded_at: Utc::now(),
        }
    }

    /// Creates a failed outcome.
    pub fn failure(kind: TaskErrorKind, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            output: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            duration,
            recorded_at: Utc::now(),
        }
    }

    /// Returns true if the outcome carries a payload.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A single unit of work inside a workflow.
///
/// # Example
///
/// ```ignore
/// let task = Task::new("b", "Task B", "document", "create_chunks")
///     .with_parameter("document_id", json!("doc-1"))
///     .depends_on("a")
///     .with_max_retries(2);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within the workflow
    pub id: TaskId,
    /// Human-readable name
    pub name: String,
    /// Executor family
    pub agent_type: String,
    /// Operation within the executor family
    pub action: String,
    /// Parameters passed to the executor
    pub parameters: Parameters,
    /// Tasks that must complete before this one may start
    pub dependencies: Vec<TaskId>,
    /// Budget of a single executor call
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Retries allowed after the first failure
    pub max_retries: u32,
    /// Retries consumed so far
    pub retry_count: u32,
    /// Current status
    pub status: TaskStatus,
    /// Outcome of the most recent attempt
    pub result: Option<TaskOutcome>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a pending task with default timeout and retry budget.
    pub fn new(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        agent_type: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: agent_type.into(),
            action: action.into(),
            parameters: Parameters::new(),
            dependencies: Vec::new(),
            timeout: DEFAULT_TASK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_count: 0,
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Replaces the parameter map.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets a single parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Adds a dependency on another task.
    pub fn depends_on(mut self, dependency: impl Into<TaskId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns true if another retry is allowed.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Moves the task into RUNNING.
    pub(crate) fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
    }

    /// Records a successful attempt.
    pub(crate) fn mark_completed(&mut self, outcome: TaskOutcome) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(outcome.recorded_at);
        self.result = Some(outcome);
    }

    /// Records a failed attempt.
    ///
    /// Returns `true` if the retry policy allows another attempt; the caller
    /// then moves the task back with [`requeue`](Self::requeue).
    pub(crate) fn mark_failed(&mut self, outcome: TaskOutcome) -> bool {
        let repeated_deterministic = match (&outcome.error_kind, &self.result) {
            (Some(kind), Some(previous)) if kind.is_deterministic() => {
                previous.error_kind == Some(*kind)
            }
            _ => false,
        };

        self.status = TaskStatus::Failed;
        self.completed_at = Some(outcome.recorded_at);
        self.result = Some(outcome);

        self.can_retry() && !repeated_deterministic
    }

    /// Consumes one retry and returns a failed task to PENDING.
    pub(crate) fn requeue(&mut self) {
        self.retry_count += 1;
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
    }

    /// Forces a running task into CANCELLED.
    pub(crate) fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Execution time of the last attempt, if any.
    pub fn execution_time(&self) -> Option<Duration> {
        self.result.as_ref().map(|r| r.duration)
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
