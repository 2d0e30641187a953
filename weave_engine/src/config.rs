//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error types for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A ceiling or interval is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Scheduler limits and task defaults.
///
/// # Example
///
/// ```yaml
/// max_concurrent_workflows: 4
/// max_concurrent_tasks: 8
/// poll_interval_ms: 50
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Workflows that may be held (created or running) at once
    pub max_concurrent_workflows: usize,
    /// Tasks that may run at once across all workflows
    pub max_concurrent_tasks: usize,
    /// Upper bound on the driver loop's wait between passes
    pub poll_interval_ms: u64,
    /// Timeout for tasks built from definitions without one
    pub default_task_timeout_secs: u64,
    /// Retry budget for tasks built from definitions without one
    pub default_max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 10,
            max_concurrent_tasks: 20,
            poll_interval_ms: 100,
            default_task_timeout_secs: 300,
            default_max_retries: 3,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_workflows(mut self, max: usize) -> Self {
        self.max_concurrent_workflows = max;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_task_timeout(&self) -> Duration {
        Duration::from_secs(self.default_task_timeout_secs)
    }

    /// Checks that every ceiling allows progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_workflows == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_workflows must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a YAML document. Missing keys take defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml_str(&content)
    }
}
