//! Workflow orchestration.
//!
//! # Architecture
//!
//! - [`Task`](task::Task) and [`Workflow`](dag::Workflow): data plus status,
//!   with graph queries and validation on the workflow
//! - [`ExecutorRegistry`](registry::ExecutorRegistry): routes
//!   `(agent_type, action)` to a [`TaskExecutor`](registry::TaskExecutor)
//! - [`WorkflowEngine`](engine::WorkflowEngine): admission, driver loops,
//!   retries, cancellation and status
//! - [`EventNotifier`](events::EventNotifier): lifecycle fan-out
//!
//! Definitions ([`yaml`]) and templates ([`templates`]) are two ways of
//! building a [`Workflow`](dag::Workflow) without the builder API.

pub mod builtin;
pub mod cancellation;
pub mod dag;
pub mod engine;
pub mod events;
pub mod params;
pub mod registry;
pub mod state;
pub mod task;
pub mod templates;
pub mod yaml;

// Re-export core types for public API
pub use cancellation::{CancellationToken, CancellationTokenSource};
pub use dag::{BlockedTask, Progress, Workflow, WorkflowError, WorkflowStatus};
pub use engine::{EngineError, EngineStats, WorkflowEngine, WorkflowEngineBuilder};
pub use events::{EventListener, EventLog, EventNotifier, RecordedEvent, WorkflowEvent};
pub use params::{output_of, ParameterError};
pub use registry::{AgentFallback, ExecutorRegistry, FnExecutor, TaskContext, TaskError, TaskExecutor};
pub use state::{TaskFailure, TaskSummary, WorkflowSnapshot};
pub use task::{Parameters, Task, TaskErrorKind, TaskId, TaskOutcome, TaskStatus};
pub use templates::WorkflowTemplate;
pub use yaml::{DefinitionError, TaskDefinition, WorkflowDefinition};
