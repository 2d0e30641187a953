//! Typed references from task parameters to dependency outputs.
//!
//! A parameter value shaped like `{"$from": "<task id>"}` is replaced with the
//! output that task wrote into the workflow context. An optional `"pointer"`
//! selects a sub-value with JSON Pointer syntax:
//!
//! ```yaml
//! parameters:
//!   summary: { $from: analyze, pointer: /summary }
//! ```
//!
//! Resolution runs in the driver loop right before dispatch, after the
//! referenced task was observed COMPLETED. Missing keys are errors, never
//! silently empty values.

use crate::workflow::task::{Parameters, TaskId};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Key marking a dependency reference.
pub const REFERENCE_KEY: &str = "$from";
const POINTER_KEY: &str = "pointer";

/// Error types for parameter resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    /// Referenced task has no output in the context
    #[error("Parameter '{parameter}' references '{task_id}', which has no recorded output")]
    MissingOutput { parameter: String, task_id: TaskId },

    /// Pointer does not select anything in the referenced output
    #[error("Parameter '{parameter}' pointer '{pointer}' not found in output of '{task_id}'")]
    MissingPointer {
        parameter: String,
        task_id: TaskId,
        pointer: String,
    },

    /// Reference object is malformed
    #[error("Parameter '{parameter}' has an invalid reference: {reason}")]
    InvalidReference { parameter: String, reason: String },
}

/// Builds a reference value pointing at another task's output.
///
/// # Example
///
/// ```ignore
/// let task = Task::new("report", "Report", "chat", "generate_report")
///     .with_parameter("facts", output_of("fact_check", Some("/verified")))
///     .depends_on("fact_check");
/// ```
pub fn output_of(task_id: impl Into<String>, pointer: Option<&str>) -> Value {
    match pointer {
        Some(pointer) => json!({ REFERENCE_KEY: task_id.into(), POINTER_KEY: pointer }),
        None => json!({ REFERENCE_KEY: task_id.into() }),
    }
}

/// Task ids referenced anywhere in the parameter map.
pub fn referenced_tasks(parameters: &Parameters) -> Vec<TaskId> {
    let mut out = Vec::new();
    for value in parameters.values() {
        collect_references(value, &mut out);
    }
    out
}

fn collect_references(value: &Value, out: &mut Vec<TaskId>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get(REFERENCE_KEY) {
                out.push(TaskId::new(id.clone()));
            } else {
                map.values().for_each(|v| collect_references(v, out));
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

/// Resolves every reference in `parameters` against `context`.
pub fn resolve(parameters: &Parameters, context: &Map<String, Value>) -> Result<Parameters, ParameterError> {
    parameters
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_value(key, value, context)?)))
        .collect()
}

fn resolve_value(
    parameter: &str,
    value: &Value,
    context: &Map<String, Value>,
) -> Result<Value, ParameterError> {
    match value {
        Value::Object(map) if map.contains_key(REFERENCE_KEY) => {
            resolve_reference(parameter, map, context)
        }
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(parameter, v, context)?)))
            .collect::<Result<Map<_, _>, _>>()
            .map(Value::Object),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(parameter, v, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn resolve_reference(
    parameter: &str,
    reference: &Map<String, Value>,
    context: &Map<String, Value>,
) -> Result<Value, ParameterError> {
    let task_id = reference
        .get(REFERENCE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| ParameterError::InvalidReference {
            parameter: parameter.to_string(),
            reason: format!("'{}' must be a task id string", REFERENCE_KEY),
        })?;

    let output = context
        .get(task_id)
        .ok_or_else(|| ParameterError::MissingOutput {
            parameter: parameter.to_string(),
            task_id: TaskId::new(task_id),
        })?;

    match reference.get(POINTER_KEY) {
        None => Ok(output.clone()),
        Some(Value::String(pointer)) => {
            output
                .pointer(pointer)
                .cloned()
                .ok_or_else(|| ParameterError::MissingPointer {
                    parameter: parameter.to_string(),
                    task_id: TaskId::new(task_id),
                    pointer: pointer.clone(),
                })
        }
        Some(_) => Err(ParameterError::InvalidReference {
            parameter: parameter.to_string(),
            reason: format!("'{}' must be a string", POINTER_KEY),
        }),
    }
}
