//! Dependency-graph workflow scheduler.
//!
//! This crate executes workflows: named sets of tasks with declared
//! dependencies. The engine:
//!
//! - Dispatches a task only after every dependency completed
//! - Bounds running tasks and driving workflows with engine-wide ceilings
//! - Retries failed tasks up to a per-task budget
//! - Fails a workflow that can make no further progress
//! - Reports progress through snapshots and lifecycle events
//!
//! # Example
//!
//! ```ignore
//! use weave_engine::{core_registry, EngineConfig, Task, Workflow, WorkflowEngine};
//!
//! let engine = WorkflowEngine::new(EngineConfig::default(), core_registry())?;
//! let workflow = Workflow::new("Linear", "A then B")
//!     .with_task(Task::new("a", "A", "core", "echo"))
//!     .with_task(Task::new("b", "B", "core", "echo").depends_on("a"));
//!
//! let id = engine.submit(workflow).await?;
//! let snapshot = engine.wait(&id).await?;
//! ```

pub mod cli;
pub mod config;
pub mod workflow;

pub use config::{ConfigError, EngineConfig};
pub use workflow::{
    builtin::{core_registry, register_core},
    output_of, AgentFallback, CancellationToken, CancellationTokenSource, DefinitionError,
    EngineError, EngineStats, EventListener, EventLog, ExecutorRegistry, FnExecutor, Parameters,
    ParameterError, RecordedEvent, Task, TaskContext, TaskDefinition, TaskError, TaskErrorKind,
    TaskExecutor, TaskId, TaskOutcome, TaskStatus, TaskSummary, Workflow, WorkflowDefinition,
    WorkflowEngine, WorkflowEngineBuilder, WorkflowError, WorkflowEvent, WorkflowSnapshot,
    WorkflowStatus, WorkflowTemplate,
};
