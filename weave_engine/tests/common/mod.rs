//! Common test utilities for engine integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use weave_engine::{
    EngineConfig, EventLog, ExecutorRegistry, TaskError, WorkflowEngine, WorkflowSnapshot,
};

/// Start and end instants of one executor call.
#[derive(Clone, Copy, Debug)]
pub struct Span {
    pub start: Instant,
    pub end: Instant,
}

/// Shared record of executor calls made through `test:work`.
#[derive(Clone, Default)]
pub struct Recorder {
    spans: Arc<Mutex<HashMap<String, Vec<Span>>>>,
    contexts: Arc<Mutex<HashMap<String, Vec<Vec<String>>>>>,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn spans(&self, task_id: &str) -> Vec<Span> {
        self.spans
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Sorted context keys the executor saw, one entry per call.
    pub fn context_keys(&self, task_id: &str) -> Vec<Vec<String>> {
        self.contexts
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self, task_id: &str) -> usize {
        self.spans(task_id).len()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Registers `test:work` on the registry.
    ///
    /// Parameters: `ms` (sleep time), `fail_times` (fail this many attempts
    /// before succeeding, `-1` for always). The sleep ignores cancellation.
    pub fn register(&self, registry: &mut ExecutorRegistry) {
        let recorder = self.clone();
        registry.register_fn("test", "work", move |params, ctx| {
            let recorder = recorder.clone();
            async move {
                let start = Instant::now();
                let mut keys: Vec<String> = ctx.context.keys().cloned().collect();
                keys.sort();
                recorder
                    .contexts
                    .lock()
                    .unwrap()
                    .entry(ctx.task_id.to_string())
                    .or_default()
                    .push(keys);

                let now = recorder.current.fetch_add(1, Ordering::SeqCst) + 1;
                recorder.peak.fetch_max(now, Ordering::SeqCst);

                let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;

                recorder.current.fetch_sub(1, Ordering::SeqCst);
                recorder
                    .spans
                    .lock()
                    .unwrap()
                    .entry(ctx.task_id.to_string())
                    .or_default()
                    .push(Span {
                        start,
                        end: Instant::now(),
                    });

                let fail_times = params.get("fail_times").and_then(Value::as_i64).unwrap_or(0);
                if fail_times < 0 || i64::from(ctx.attempt) < fail_times {
                    return Err(TaskError::Execution(format!(
                        "attempt {} failed on purpose",
                        ctx.attempt
                    )));
                }
                Ok(json!({ "task": ctx.task_id.as_str(), "attempt": ctx.attempt }))
            }
        });
    }
}

pub fn fast_config() -> EngineConfig {
    EngineConfig::default().with_poll_interval(Duration::from_millis(10))
}

/// Builds an engine with `test:work`, the core executors and an event log.
pub fn test_engine(config: EngineConfig) -> (WorkflowEngine, Recorder, EventLog) {
    let recorder = Recorder::default();
    let mut registry = weave_engine::core_registry();
    recorder.register(&mut registry);
    let log = EventLog::new();
    let engine = WorkflowEngine::builder(config)
        .with_registry(registry)
        .add_listener(Arc::new(log.clone()))
        .build()
        .unwrap();
    (engine, recorder, log)
}

/// Waits for a terminal status, failing the test after five seconds.
pub async fn finish(engine: &WorkflowEngine, id: &str) -> WorkflowSnapshot {
    tokio::time::timeout(Duration::from_secs(5), engine.wait(id))
        .await
        .expect("workflow did not finish in time")
        .unwrap()
}
