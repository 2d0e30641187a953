//! Declarative workflow definitions in YAML or JSON.
//!
//! A definition mirrors a creation request: name, description, metadata and a
//! list of tasks. Tasks without an explicit id get `task_{index}_{name}` with
//! the name in snake case.

use crate::config::EngineConfig;
use crate::workflow::dag::{Workflow, WorkflowError};
use crate::workflow::task::{Parameters, Task, DEFAULT_MAX_RETRIES, DEFAULT_TASK_TIMEOUT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Workflow definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
    /// Optional fixed workflow id; a UUID is generated otherwise
    #[serde(default)]
    pub id: Option<String>,
    /// Opaque creator reference
    #[serde(default)]
    pub created_by: Option<String>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Workflow tasks in declaration order
    pub tasks: Vec<TaskDefinition>,
}

/// Task entry of a [`WorkflowDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique task identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable task name
    pub name: String,
    /// Executor family
    pub agent_type: String,
    /// Operation within the executor family
    pub action: String,
    /// Executor parameters, may contain `$from` references
    #[serde(default)]
    pub parameters: Parameters,
    /// Task dependencies (task IDs)
    #[serde(default, alias = "depends_on")]
    pub dependencies: Vec<String>,
    /// Per-attempt timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retry budget
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Errors that can occur while loading a definition.
#[derive(Error, Debug)]
pub enum DefinitionError {
    /// Definition converts into an invalid workflow
    #[error("Invalid workflow definition: {0}")]
    Invalid(#[from] WorkflowError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl WorkflowDefinition {
    /// Parses a YAML document.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let yaml = r#"
    /// name: "Fan-in"
    /// tasks:
    ///   - id: a
    ///     name: A
    ///     agent_type: core
    ///     action: echo
    ///   - id: b
    ///     name: B
    ///     agent_type: core
    ///     action: echo
    ///     parameters:
    ///       upstream: { $from: a }
    ///     dependencies: [a]
    /// "#;
    /// let workflow = WorkflowDefinition::from_yaml_str(yaml)?.into_workflow()?;
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a definition file; `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Converts into a validated workflow using built-in task defaults.
    pub fn into_workflow(self) -> Result<Workflow, DefinitionError> {
        self.build(DEFAULT_TASK_TIMEOUT, DEFAULT_MAX_RETRIES)
    }

    /// Converts into a validated workflow using the engine's task defaults.
    pub fn into_workflow_with(self, config: &EngineConfig) -> Result<Workflow, DefinitionError> {
        self.build(config.default_task_timeout(), config.default_max_retries)
    }

    fn build(self, default_timeout: Duration, default_retries: u32) -> Result<Workflow, DefinitionError> {
        let mut workflow = match self.id {
            Some(id) => Workflow::with_id(id, self.name, self.description),
            None => Workflow::new(self.name, self.description),
        };
        workflow.created_by = self.created_by;
        workflow.metadata = self.metadata;

        for (index, def) in self.tasks.into_iter().enumerate() {
            let id = def
                .id
                .unwrap_or_else(|| format!("task_{}_{}", index, snake_case(&def.name)));
            let mut task = Task::new(id, def.name, def.agent_type, def.action)
                .with_parameters(def.parameters)
                .with_timeout(def.timeout_secs.map(Duration::from_secs).unwrap_or(default_timeout))
                .with_max_retries(def.max_retries.unwrap_or(default_retries));
            for dependency in def.dependencies {
                task = task.depends_on(dependency);
            }
            workflow.add_task(task);
        }

        workflow.validate()?;
        Ok(workflow)
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}
