//! Command-line interface for the workflow engine.
//!
//! # Examples
//!
//! Check a definition without running it:
//!
//! ```bash
//! $ weave validate pipeline.yaml
//! ```
//!
//! Run a definition with the built-in `core` executors:
//!
//! ```bash
//! $ weave run pipeline.yaml --config engine.yaml --timeout 60
//! ```

use crate::config::EngineConfig;
use crate::workflow::builtin::core_registry;
use crate::workflow::dag::{Workflow, WorkflowStatus};
use crate::workflow::events::EventLog;
use crate::workflow::state::WorkflowSnapshot;
use crate::workflow::engine::{EngineError, WorkflowEngine};
use crate::workflow::yaml::WorkflowDefinition;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// CLI arguments for the engine.
#[derive(Parser, Debug)]
#[command(name = "weave", version, about = "Run dependency-graph workflows")]
struct Cli {
    #[command(subcommand)]
    action: Action,
}

/// Engine actions available via CLI.
#[derive(Subcommand, Debug)]
enum Action {
    /// Parse and validate a workflow definition
    Validate {
        /// Workflow definition (YAML, or JSON with a .json extension)
        file: PathBuf,
    },

    /// Run a workflow definition to completion and print its final status
    Run {
        /// Workflow definition (YAML, or JSON with a .json extension)
        file: PathBuf,

        /// Engine configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Give up after this many seconds and cancel the workflow
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Also print the lifecycle event trail to stderr
        #[arg(long)]
        events: bool,
    },
}

/// Loads, converts and validates a definition file.
pub async fn validate_file(path: &Path, config: &EngineConfig) -> anyhow::Result<Workflow> {
    let definition = WorkflowDefinition::from_file(path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    let workflow = definition
        .into_workflow_with(config)
        .with_context(|| format!("invalid workflow in {}", path.display()))?;
    Ok(workflow)
}

/// Runs a definition file with the built-in executors.
///
/// On timeout the workflow is cancelled and its cancelled snapshot returned.
pub async fn run_file(
    path: &Path,
    config: EngineConfig,
    timeout: Option<Duration>,
    log: Option<EventLog>,
) -> anyhow::Result<WorkflowSnapshot> {
    let workflow = validate_file(path, &config).await?;

    let mut builder = WorkflowEngine::builder(config).with_registry(core_registry());
    if let Some(log) = log {
        builder = builder.add_listener(Arc::new(log));
    }
    let engine = builder.build()?;

    let id = engine.submit(workflow).await?;
    let snapshot = match timeout {
        Some(limit) => match tokio::time::timeout(limit, engine.wait(&id)).await {
            Ok(snapshot) => snapshot?,
            Err(_) => {
                tracing::warn!(workflow_id = %id, timeout_secs = limit.as_secs(), "Run timed out, cancelling");
                cancel_and_wait(&engine, &id).await?
            }
        },
        None => engine.wait(&id).await?,
    };
    engine.shutdown().await;
    Ok(snapshot)
}

/// Cancels a workflow and returns its final snapshot.
///
/// A workflow that reached a terminal state first keeps that state.
async fn cancel_and_wait(engine: &WorkflowEngine, id: &str) -> anyhow::Result<WorkflowSnapshot> {
    match engine.cancel(id).await {
        Ok(()) | Err(EngineError::InvalidState { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(engine.wait(id).await?)
}

/// Entry point for the CLI. Returns true when the command succeeded.
pub async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    match cli.action {
        Action::Validate { file } => {
            let workflow = validate_file(&file, &EngineConfig::default()).await?;
            let order = workflow.execution_order()?;
            println!("{}: {} tasks", workflow.name, workflow.task_count());
            for (i, id) in order.iter().enumerate() {
                println!("  {}. {}", i + 1, id);
            }
            for (task, dependency) in workflow.unknown_dependencies() {
                println!("  warning: {} depends on unknown task {}", task, dependency);
            }
            Ok(true)
        }

        Action::Run {
            file,
            config,
            timeout,
            events,
        } => {
            let config = match config {
                Some(path) => EngineConfig::load(&path)
                    .await
                    .with_context(|| format!("failed to load config {}", path.display()))?,
                None => EngineConfig::default(),
            };
            let log = events.then(EventLog::new);

            let snapshot = run_file(&file, config, timeout.map(Duration::from_secs), log.clone()).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            if let Some(log) = log {
                eprintln!("{}", log.to_json()?);
            }
            Ok(snapshot.status == WorkflowStatus::Completed)
        }
    }
}
