//! Lifecycle event fan-out.
//!
//! The [`EventNotifier`] calls every registered [`EventListener`] in
//! registration order for each workflow and task transition. Listener errors
//! and panics are logged and swallowed so observers cannot break scheduling.
//!
//! [`EventLog`] is an in-memory listener that keeps a timestamped trail of
//! every event it sees.

use crate::workflow::dag::WorkflowStatus;
use crate::workflow::state::{TaskSummary, WorkflowSnapshot};
use crate::workflow::task::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Lifecycle transitions reported to listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowCreated,
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
}

impl WorkflowEvent {
    /// Returns the event name, e.g. `task_completed`.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowCreated => "workflow_created",
            WorkflowEvent::WorkflowStarted => "workflow_started",
            WorkflowEvent::WorkflowCompleted => "workflow_completed",
            WorkflowEvent::WorkflowFailed => "workflow_failed",
            WorkflowEvent::WorkflowCancelled => "workflow_cancelled",
            WorkflowEvent::TaskStarted => "task_started",
            WorkflowEvent::TaskCompleted => "task_completed",
            WorkflowEvent::TaskFailed => "task_failed",
        }
    }

    /// Returns true for task-level events.
    pub fn is_task_event(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::TaskStarted | WorkflowEvent::TaskCompleted | WorkflowEvent::TaskFailed
        )
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer of lifecycle events.
///
/// Called synchronously from the engine; implementations must not block
/// significantly.
pub trait EventListener: Send + Sync {
    fn notify(
        &self,
        event: WorkflowEvent,
        workflow: &WorkflowSnapshot,
        task: Option<&TaskSummary>,
    ) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(WorkflowEvent, &WorkflowSnapshot, Option<&TaskSummary>) -> anyhow::Result<()> + Send + Sync,
{
    fn notify(
        &self,
        event: WorkflowEvent,
        workflow: &WorkflowSnapshot,
        task: Option<&TaskSummary>,
    ) -> anyhow::Result<()> {
        self(event, workflow, task)
    }
}

/// Ordered list of listeners.
#[derive(Clone, Default)]
pub struct EventNotifier {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener; listeners run in registration order.
    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Delivers an event to every listener.
    pub fn notify(&self, event: WorkflowEvent, workflow: &WorkflowSnapshot, task: Option<&TaskSummary>) {
        for listener in &self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.notify(event, workflow, task)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(
                        workflow_id = %workflow.id,
                        event = %event,
                        error = %e,
                        "Workflow listener error"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        workflow_id = %workflow.id,
                        event = %event,
                        "Workflow listener panicked"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// An event as captured by [`EventLog`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub timestamp: DateTime<Utc>,
    pub event: WorkflowEvent,
    pub workflow_id: String,
    pub workflow_status: WorkflowStatus,
    pub task_id: Option<String>,
    pub task_status: Option<TaskStatus>,
    pub error: Option<String>,
}

/// In-memory event trail.
///
/// Cloning shares the underlying buffer, so a clone can be registered as a
/// listener while the original is inspected.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Returns events of one kind.
    pub fn events_of(&self, kind: WorkflowEvent) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event == kind)
            .collect()
    }

    /// Returns the recorded event names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event.as_str()).collect()
    }

    /// Serializes the trail as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events())
    }
}

impl EventListener for EventLog {
    fn notify(
        &self,
        event: WorkflowEvent,
        workflow: &WorkflowSnapshot,
        task: Option<&TaskSummary>,
    ) -> anyhow::Result<()> {
        let record = RecordedEvent {
            timestamp: Utc::now(),
            event,
            workflow_id: workflow.id.clone(),
            workflow_status: workflow.status,
            task_id: task.map(|t| t.id.clone()),
            task_status: task.map(|t| t.status),
            error: task
                .and_then(|t| t.error.clone())
                .or_else(|| workflow.error.clone()),
        };
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?
            .push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::dag::Workflow;
    use crate::workflow::task::Task;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot() -> WorkflowSnapshot {
        let workflow = Workflow::new("wf", "").with_task(Task::new("a", "A", "core", "echo"));
        WorkflowSnapshot::capture(&workflow)
    }

    #[test]
    fn test_event_names() {
        assert_eq!(WorkflowEvent::WorkflowCreated.as_str(), "workflow_created");
        assert_eq!(WorkflowEvent::TaskFailed.to_string(), "task_failed");
        assert!(WorkflowEvent::TaskStarted.is_task_event());
        assert!(!WorkflowEvent::WorkflowCancelled.is_task_event());
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = EventNotifier::new();

        for n in 0..3 {
            let order = order.clone();
            notifier.add_listener(Arc::new(
                move |_: WorkflowEvent, _: &WorkflowSnapshot, _: Option<&TaskSummary>| -> anyhow::Result<()> {
                    order.lock().unwrap().push(n);
                    Ok(())
                },
            ));
        }

        notifier.notify(WorkflowEvent::WorkflowStarted, &snapshot(), None);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_and_panicking_listeners_are_contained() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let mut notifier = EventNotifier::new();

        notifier.add_listener(Arc::new(
            |_: WorkflowEvent, _: &WorkflowSnapshot, _: Option<&TaskSummary>| -> anyhow::Result<()> {
                Err(anyhow::anyhow!("listener failed"))
            },
        ));
        notifier.add_listener(Arc::new(
            |_: WorkflowEvent, _: &WorkflowSnapshot, _: Option<&TaskSummary>| -> anyhow::Result<()> {
                panic!("listener exploded")
            },
        ));
        let counter = delivered.clone();
        notifier.add_listener(Arc::new(
            move |_: WorkflowEvent, _: &WorkflowSnapshot, _: Option<&TaskSummary>| -> anyhow::Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ));

        notifier.notify(WorkflowEvent::WorkflowCompleted, &snapshot(), None);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_log_records_task_events() {
        let log = EventLog::new();
        let mut notifier = EventNotifier::new();
        notifier.add_listener(Arc::new(log.clone()));

        let wf = snapshot();
        let task = wf.tasks[0].clone();
        notifier.notify(WorkflowEvent::WorkflowCreated, &wf, None);
        notifier.notify(WorkflowEvent::TaskStarted, &wf, Some(&task));

        assert_eq!(log.names(), vec!["workflow_created", "task_started"]);
        let started = log.events_of(WorkflowEvent::TaskStarted);
        assert_eq!(started[0].task_id.as_deref(), Some("a"));
        assert!(log.to_json().unwrap().contains("task_started"));
    }
}
