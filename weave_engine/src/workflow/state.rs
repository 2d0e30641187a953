//! Workflow state inspection API.
//!
//! Snapshots are plain serializable copies of a workflow's state taken under
//! its lock, so callers polling status always see a consistent view.

use crate::workflow::dag::{Progress, Workflow, WorkflowStatus};
use crate::workflow::task::{Task, TaskErrorKind, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Summary of a task's state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub action: String,
    pub status: TaskStatus,
    pub dependencies: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration of the last attempt in milliseconds
    pub execution_time_ms: Option<u64>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub error_kind: Option<TaskErrorKind>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        let result = task.result.as_ref();
        Self {
            id: task.id.to_string(),
            name: task.name.clone(),
            agent_type: task.agent_type.clone(),
            action: task.action.clone(),
            status: task.status,
            dependencies: task.dependencies.iter().map(|d| d.to_string()).collect(),
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            started_at: task.started_at,
            completed_at: task.completed_at,
            execution_time_ms: result.map(|r| r.duration.as_millis() as u64),
            output: result.and_then(|r| r.output.clone()),
            error: result.and_then(|r| r.error.clone()),
            error_kind: result.and_then(|r| r.error_kind),
        }
    }
}

/// A task that ended FAILED, with its last error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: String,
    pub name: String,
    pub error: String,
    pub attempts: u32,
}

/// Snapshot of workflow execution state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: WorkflowStatus,
    pub progress: Progress,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: Map<String, Value>,
    /// Reason recorded when the workflow failed
    pub error: Option<String>,
    /// Tasks whose last attempt failed
    pub failed_tasks: Vec<TaskFailure>,
    pub tasks: Vec<TaskSummary>,
}

impl WorkflowSnapshot {
    /// Captures the current state of a workflow.
    pub fn capture(workflow: &Workflow) -> Self {
        let failed_tasks = workflow
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| TaskFailure {
                task_id: t.id.to_string(),
                name: t.name.clone(),
                error: t
                    .result
                    .as_ref()
                    .and_then(|r| r.error.clone())
                    .unwrap_or_default(),
                attempts: t.retry_count + 1,
            })
            .collect();

        Self {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            status: workflow.status,
            progress: workflow.progress(),
            created_by: workflow.created_by.clone(),
            created_at: workflow.created_at,
            started_at: workflow.started_at,
            completed_at: workflow.completed_at,
            metadata: workflow.metadata.clone(),
            error: workflow.failure_reason().map(str::to_string),
            failed_tasks,
            tasks: workflow.tasks.iter().map(TaskSummary::from).collect(),
        }
    }

    /// Returns the summary for a task id.
    pub fn task(&self, id: &str) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.id == id)
    }
}
