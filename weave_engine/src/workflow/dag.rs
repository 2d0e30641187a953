//! Workflow representation and dependency-graph queries.
//!
//! A [`Workflow`] owns an ordered list of [`Task`]s. Dependencies are stored on
//! the tasks themselves; the graph view used for cycle detection and
//! topological ordering is built on demand with petgraph.

use crate::workflow::params::referenced_tasks;
use crate::workflow::task::{Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error types for workflow structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Cycle detected in the dependency graph
    #[error("Cycle detected in workflow involving tasks: {0:?}")]
    CycleDetected(Vec<TaskId>),

    /// Two tasks share an id
    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    /// Workflow is empty
    #[error("Workflow cannot be empty")]
    EmptyWorkflow,

    /// A `$from` reference names a task that is not an ancestor
    #[error("Task '{task}' references '{reference}' without depending on it")]
    UndeclaredReference { task: TaskId, reference: TaskId },
}

/// Status of a workflow execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Registered but not started
    Created,
    /// Driver loop is active
    Running,
    /// Every task completed
    Completed,
    /// No further progress possible
    Failed,
    /// Cancelled by the caller
    Cancelled,
    /// Reserved
    Paused,
}

impl WorkflowStatus {
    /// Returns true for states that are entered exactly once and never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Returns the lowercase wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Created => "created",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task counts by status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
    pub cancelled: usize,
    /// Completed share in percent (0.0 for an empty workflow)
    pub percent: f64,
}

/// A pending task that cannot become ready.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTask {
    pub task_id: TaskId,
    /// Dependencies that are missing or will never complete
    pub unresolved: Vec<TaskId>,
}

/// An ordered collection of tasks plus shared context and overall status.
///
/// # Example
///
/// ```ignore
/// let workflow = Workflow::new("Linear", "A then B")
///     .with_task(Task::new("a", "A", "core", "echo"))
///     .with_task(Task::new("b", "B", "core", "echo").depends_on("a"));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Tasks in declaration order; the order is the dispatch tie-break
    pub tasks: Vec<Task>,
    pub status: WorkflowStatus,
    pub created_by: Option<String>,
    pub metadata: Map<String, Value>,
    /// Completed task outputs keyed by task id
    pub context: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Creates an empty workflow with a fresh UUID.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, description)
    }

    /// Creates an empty workflow with a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            tasks: Vec::new(),
            status: WorkflowStatus::Created,
            created_by: None,
            metadata: Map::new(),
            context: Map::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Appends a task.
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Appends a task in place.
    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Sets the creator reference.
    pub fn created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    /// Sets a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the task with the given id.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Returns the number of tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Returns the reason recorded when the workflow failed.
    pub fn failure_reason(&self) -> Option<&str> {
        self.metadata.get("error").and_then(Value::as_str)
    }

    fn status_index(&self) -> HashMap<&TaskId, TaskStatus> {
        self.tasks.iter().map(|t| (&t.id, t.status)).collect()
    }

    /// Returns indices of tasks that may be dispatched now, in declaration order.
    ///
    /// A task is ready iff it is PENDING and every dependency refers to a
    /// COMPLETED task. A dependency on an unknown id is never satisfied.
    pub fn ready_tasks(&self) -> Vec<usize> {
        let statuses = self.status_index();
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.status == TaskStatus::Pending)
            .filter(|(_, task)| {
                task.dependencies
                    .iter()
                    .all(|dep| statuses.get(dep) == Some(&TaskStatus::Completed))
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Returns true iff every task is COMPLETED.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    /// Returns true if any task is RUNNING.
    pub fn has_running(&self) -> bool {
        self.tasks.iter().any(|t| t.status == TaskStatus::Running)
    }

    /// Pending tasks with the dependencies that keep them from becoming ready.
    pub fn blocked_tasks(&self) -> Vec<BlockedTask> {
        let statuses = self.status_index();
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| BlockedTask {
                task_id: t.id.clone(),
                unresolved: t
                    .dependencies
                    .iter()
                    .filter(|dep| statuses.get(dep) != Some(&TaskStatus::Completed))
                    .cloned()
                    .collect(),
            })
            .filter(|b| !b.unresolved.is_empty())
            .collect()
    }

    /// Tasks whose retry budget is spent.
    pub fn exhausted_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect()
    }

    /// Dependency ids that do not name a task in this workflow.
    pub fn unknown_dependencies(&self) -> Vec<(TaskId, TaskId)> {
        let known: HashSet<&TaskId> = self.tasks.iter().map(|t| &t.id).collect();
        self.tasks
            .iter()
            .flat_map(|t| {
                t.dependencies
                    .iter()
                    .filter(|dep| !known.contains(dep))
                    .map(move |dep| (t.id.clone(), dep.clone()))
            })
            .collect()
    }

    /// Counts tasks by status.
    pub fn progress(&self) -> Progress {
        let mut progress = Progress {
            total: self.tasks.len(),
            ..Progress::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Failed => progress.failed += 1,
                TaskStatus::Running => progress.running += 1,
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::Cancelled => progress.cancelled += 1,
            }
        }
        if progress.total > 0 {
            progress.percent = progress.completed as f64 / progress.total as f64 * 100.0;
        }
        progress
    }

    /// Builds the dependency graph (edge `dep -> task`), skipping unknown ids.
    fn graph(&self) -> (DiGraph<TaskId, ()>, HashMap<TaskId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for task in &self.tasks {
            let idx = graph.add_node(task.id.clone());
            index.insert(task.id.clone(), idx);
        }
        for task in &self.tasks {
            for dep in &task.dependencies {
                if let (Some(&from), Some(&to)) = (index.get(dep), index.get(&task.id)) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        (graph, index)
    }

    /// Validates the workflow structure.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::EmptyWorkflow` - No tasks
    /// - `WorkflowError::DuplicateTask` - Two tasks share an id
    /// - `WorkflowError::CycleDetected` - Dependencies form a cycle (including
    ///   a task depending on itself)
    /// - `WorkflowError::UndeclaredReference` - A `$from` parameter names a
    ///   task that is neither a direct nor a transitive dependency
    ///
    /// Dependencies on unknown ids are not an error here; they surface at run
    /// time as a deadlock.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.tasks.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(&task.id) {
                return Err(WorkflowError::DuplicateTask(task.id.clone()));
            }
        }

        if let Some(task) = self.tasks.iter().find(|t| t.dependencies.contains(&t.id)) {
            return Err(WorkflowError::CycleDetected(vec![task.id.clone()]));
        }

        let (graph, index) = self.graph();
        if let Some(scc) = tarjan_scc(&graph).into_iter().find(|scc| scc.len() > 1) {
            let mut cycle: Vec<TaskId> = scc
                .into_iter()
                .filter_map(|idx| graph.node_weight(idx).cloned())
                .collect();
            cycle.sort();
            return Err(WorkflowError::CycleDetected(cycle));
        }

        for task in &self.tasks {
            let references = referenced_tasks(&task.parameters);
            if references.is_empty() {
                continue;
            }
            let Some(&node) = index.get(&task.id) else {
                continue;
            };
            let ancestors = ancestors(&graph, node);
            if let Some(reference) = references
                .into_iter()
                .find(|r| !task.dependencies.contains(r) && !ancestors.contains(r))
            {
                return Err(WorkflowError::UndeclaredReference {
                    task: task.id.clone(),
                    reference,
                });
            }
        }

        Ok(())
    }

    /// Returns task ids in a topological order.
    pub fn execution_order(&self) -> Result<Vec<TaskId>, WorkflowError> {
        if self.tasks.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }
        let (graph, _) = self.graph();
        let sorted = toposort(&graph, None).map_err(|cycle| {
            let id = graph[cycle.node_id()].clone();
            WorkflowError::CycleDetected(vec![id])
        })?;
        Ok(sorted.into_iter().map(|idx| graph[idx].clone()).collect())
    }
}

/// Every task reachable by walking dependency edges backwards from `start`.
fn ancestors(graph: &DiGraph<TaskId, ()>, start: NodeIndex) -> HashSet<TaskId> {
    let reversed = Reversed(graph);
    let mut dfs = Dfs::new(reversed, start);
    let mut found = HashSet::new();
    while let Some(idx) = dfs.next(reversed) {
        if idx != start {
            found.insert(graph[idx].clone());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::params::output_of;
    use serde_json::json;

    fn task(id: &str) -> Task {
        Task::new(id, id.to_uppercase(), "core", "echo")
    }

    #[test]
    fn test_workflow_creation() {
        let workflow = Workflow::new("wf", "test");
        assert_eq!(workflow.status, WorkflowStatus::Created);
        assert_eq!(workflow.task_count(), 0);
        assert!(Uuid::parse_str(&workflow.id).is_ok());
        assert_eq!(workflow.validate(), Err(WorkflowError::EmptyWorkflow));
    }

    #[test]
    fn test_ready_tasks_follow_declaration_order() {
        let mut workflow = Workflow::new("wf", "")
            .with_task(task("c"))
            .with_task(task("a"))
            .with_task(task("b").depends_on("a"));

        assert_eq!(workflow.ready_tasks(), vec![0, 1]);

        workflow.tasks[1].status = TaskStatus::Completed;
        assert_eq!(workflow.ready_tasks(), vec![0, 2]);
    }

    #[test]
    fn test_failed_dependency_is_not_satisfied() {
        let mut workflow = Workflow::new("wf", "")
            .with_task(task("a"))
            .with_task(task("b").depends_on("a"));
        workflow.tasks[0].status = TaskStatus::Failed;

        assert!(workflow.ready_tasks().is_empty());
        let blocked = workflow.blocked_tasks();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].unresolved, vec![TaskId::new("a")]);
    }

    #[test]
    fn test_unknown_dependency_never_ready() {
        let workflow = Workflow::new("wf", "").with_task(task("a").depends_on("ghost"));

        assert!(workflow.ready_tasks().is_empty());
        assert!(workflow.validate().is_ok());
        assert_eq!(
            workflow.unknown_dependencies(),
            vec![(TaskId::new("a"), TaskId::new("ghost"))]
        );
    }

    #[test]
    fn test_cycle_detection() {
        let workflow = Workflow::new("wf", "")
            .with_task(task("a").depends_on("c"))
            .with_task(task("b").depends_on("a"))
            .with_task(task("c").depends_on("b"));

        match workflow.validate() {
            Err(WorkflowError::CycleDetected(ids)) => {
                assert_eq!(ids, vec![TaskId::new("a"), TaskId::new("b"), TaskId::new("c")]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let workflow = Workflow::new("wf", "").with_task(task("a").depends_on("a"));
        assert_eq!(
            workflow.validate(),
            Err(WorkflowError::CycleDetected(vec![TaskId::new("a")]))
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let workflow = Workflow::new("wf", "").with_task(task("a")).with_task(task("a"));
        assert_eq!(
            workflow.validate(),
            Err(WorkflowError::DuplicateTask(TaskId::new("a")))
        );
    }

    #[test]
    fn test_reference_must_be_an_ancestor() {
        let workflow = Workflow::new("wf", "")
            .with_task(task("a"))
            .with_task(task("b").with_parameter("x", output_of("a", None)));

        assert_eq!(
            workflow.validate(),
            Err(WorkflowError::UndeclaredReference {
                task: TaskId::new("b"),
                reference: TaskId::new("a"),
            })
        );
    }

    #[test]
    fn test_transitive_reference_is_allowed() {
        let workflow = Workflow::new("wf", "")
            .with_task(task("a"))
            .with_task(task("b").depends_on("a"))
            .with_task(
                task("c")
                    .with_parameter("nested", json!({"inputs": [output_of("a", Some("/n"))]}))
                    .depends_on("b"),
            );
        assert!(workflow.validate().is_ok());

        let sibling = Workflow::new("wf", "")
            .with_task(task("a"))
            .with_task(task("b").depends_on("a"))
            .with_task(task("c").depends_on("a").with_parameter("x", output_of("b", None)));
        assert!(matches!(
            sibling.validate(),
            Err(WorkflowError::UndeclaredReference { .. })
        ));
    }

    #[test]
    fn test_execution_order_with_diamond() {
        let workflow = Workflow::new("wf", "")
            .with_task(task("d").depends_on("b").depends_on("c"))
            .with_task(task("b").depends_on("a"))
            .with_task(task("c").depends_on("a"))
            .with_task(task("a"));

        let order = workflow.execution_order().unwrap();
        let pos = |id: &str| order.iter().position(|t| t.as_str() == id).unwrap();

        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_progress_counts() {
        let mut workflow = Workflow::new("wf", "")
            .with_task(task("a"))
            .with_task(task("b"))
            .with_task(task("c"))
            .with_task(task("d"));
        workflow.tasks[0].status = TaskStatus::Completed;
        workflow.tasks[1].status = TaskStatus::Running;
        workflow.tasks[2].status = TaskStatus::Failed;

        let progress = workflow.progress();
        assert_eq!(progress.total, 4);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.running, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.percent, 25.0);
        assert!(!workflow.is_complete());
        assert!(workflow.has_running());
    }
}
