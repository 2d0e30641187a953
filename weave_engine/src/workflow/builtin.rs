//! Built-in `core` executors.
//!
//! Provides small executors for smoke-testing workflow definitions from the
//! command line:
//! - `core:echo` returns its parameters
//! - `core:sleep` waits `ms` milliseconds, or until the workflow is cancelled
//! - `core:fail` fails with `message` until attempt `succeed_after` is reached

use crate::workflow::registry::{ExecutorRegistry, TaskContext, TaskError, TaskExecutor};
use crate::workflow::task::Parameters;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Agent type of the built-in executors.
pub const CORE_AGENT: &str = "core";

/// Returns its parameters as the task output.
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, parameters: Parameters, _context: TaskContext) -> Result<Value, TaskError> {
        Ok(Value::Object(parameters))
    }
}

/// Sleeps for the `ms` parameter.
pub struct SleepExecutor;

#[async_trait]
impl TaskExecutor for SleepExecutor {
    async fn execute(&self, parameters: Parameters, context: TaskContext) -> Result<Value, TaskError> {
        let ms = match parameters.get("ms") {
            None => 0,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| TaskError::Execution(format!("'ms' must be a non-negative integer, got {}", value)))?,
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!({ "slept_ms": ms })),
            _ = context.cancellation_token().cancelled() => {
                Err(TaskError::Execution("sleep interrupted by cancellation".to_string()))
            }
        }
    }
}

/// Fails on purpose.
///
/// With `succeed_after: n` the executor succeeds from attempt `n` onwards
/// (attempts count from 0), which exercises the retry path.
pub struct FailExecutor;

#[async_trait]
impl TaskExecutor for FailExecutor {
    async fn execute(&self, parameters: Parameters, context: TaskContext) -> Result<Value, TaskError> {
        if let Some(threshold) = parameters.get("succeed_after").and_then(Value::as_u64) {
            if u64::from(context.attempt) >= threshold {
                return Ok(json!({ "attempt": context.attempt }));
            }
        }

        let message = parameters
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("requested failure");
        Err(TaskError::Execution(message.to_string()))
    }
}

/// Registers the `core` executors on an existing registry.
pub fn register_core(registry: &mut ExecutorRegistry) {
    registry.register(CORE_AGENT, "echo", Arc::new(EchoExecutor));
    registry.register(CORE_AGENT, "sleep", Arc::new(SleepExecutor));
    registry.register(CORE_AGENT, "fail", Arc::new(FailExecutor));
}

/// Returns a registry containing only the `core` executors.
pub fn core_registry() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    register_core(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::cancellation::CancellationTokenSource;
    use crate::workflow::task::TaskId;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap()
    }

    fn ctx() -> TaskContext {
        TaskContext::new("wf", TaskId::new("t"))
    }

    #[test]
    fn test_core_registry_keys() {
        assert_eq!(
            core_registry().keys(),
            vec!["core:echo", "core:fail", "core:sleep"]
        );
    }

    #[tokio::test]
    async fn test_echo_returns_parameters() {
        let out = EchoExecutor
            .execute(params(json!({"a": [1, 2]})), ctx())
            .await
            .unwrap();
        assert_eq!(out, json!({"a": [1, 2]}));
    }

    #[tokio::test]
    async fn test_sleep_rejects_bad_duration() {
        let err = SleepExecutor
            .execute(params(json!({"ms": "soon"})), ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'ms'"));
    }

    #[tokio::test]
    async fn test_sleep_stops_on_cancellation() {
        let source = CancellationTokenSource::new();
        let context = ctx().with_cancellation_token(source.token());
        source.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            SleepExecutor.execute(params(json!({"ms": 60_000})), context),
        )
        .await
        .expect("cancellation should interrupt the sleep");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fail_succeeds_after_threshold() {
        let input = params(json!({"message": "flaky", "succeed_after": 2}));

        let err = FailExecutor
            .execute(input.clone(), ctx().with_attempt(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Task execution failed: flaky");

        let out = FailExecutor
            .execute(input, ctx().with_attempt(2))
            .await
            .unwrap();
        assert_eq!(out, json!({"attempt": 2}));
    }
}
