//! Integration tests for dependency-ordered dispatch, ceilings and retries.

mod common;

use common::{fast_config, finish, test_engine};
use serde_json::json;
use std::time::{Duration, Instant};
use weave_engine::{Task, TaskStatus, Workflow, WorkflowEvent, WorkflowStatus};

fn work(id: &str, ms: u64) -> Task {
    Task::new(id, id.to_uppercase(), "test", "work").with_parameter("ms", json!(ms))
}

#[tokio::test]
async fn test_linear_chain_runs_in_order() {
    let (engine, recorder, log) = test_engine(fast_config());
    let workflow = Workflow::new("linear", "")
        .with_task(work("a", 10))
        .with_task(work("b", 10).depends_on("a"))
        .with_task(work("c", 10).depends_on("b"));

    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.progress.completed, 3);
    assert_eq!(snapshot.progress.percent, 100.0);

    let a = recorder.spans("a")[0];
    let b = recorder.spans("b")[0];
    let c = recorder.spans("c")[0];
    assert!(a.end <= b.start);
    assert!(b.end <= c.start);

    let started: Vec<String> = log
        .events_of(WorkflowEvent::TaskStarted)
        .into_iter()
        .filter_map(|e| e.task_id)
        .collect();
    assert_eq!(started, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_fan_in_waits_for_every_dependency() {
    let (engine, recorder, _log) = test_engine(fast_config());
    let workflow = Workflow::new("fan-in", "")
        .with_task(work("fast", 5))
        .with_task(work("slow", 60))
        .with_task(work("join", 0).depends_on("fast").depends_on("slow"));

    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    let join = recorder.spans("join")[0];
    assert!(recorder.spans("fast")[0].end <= join.start);
    assert!(recorder.spans("slow")[0].end <= join.start);

    let fast = recorder.spans("fast")[0];
    let slow = recorder.spans("slow")[0];
    assert!(fast.start < slow.end && slow.start < fast.end, "roots should overlap");

    assert_eq!(recorder.context_keys("join"), vec![vec!["fast", "slow"]]);
    assert_eq!(recorder.context_keys("fast"), vec![Vec::<String>::new()]);
}

#[tokio::test]
async fn test_completed_status_implies_every_task_completed() {
    let (engine, _recorder, _log) = test_engine(fast_config());
    let workflow = Workflow::new("diamond", "")
        .with_task(work("a", 5))
        .with_task(work("b", 5).depends_on("a"))
        .with_task(work("c", 5).depends_on("a"))
        .with_task(work("d", 5).depends_on("b").depends_on("c"));

    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert!(snapshot.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert!(snapshot.completed_at.is_some());

    let context = engine.context(&id).await.unwrap();
    assert_eq!(context.len(), 4);
    assert_eq!(context["d"]["task"], json!("d"));
}

#[tokio::test]
async fn test_concurrency_ceiling_bounds_running_tasks() {
    let config = fast_config().with_max_concurrent_tasks(2);
    let (engine, recorder, _log) = test_engine(config);

    let mut workflow = Workflow::new("wide", "");
    for i in 0..5 {
        workflow.add_task(work(&format!("t{}", i), 50));
    }

    let started = Instant::now();
    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;
    let elapsed = started.elapsed();

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert!(recorder.peak() <= 2, "peak concurrency was {}", recorder.peak());
    // Five 50 ms tasks through two slots need at least three waves.
    assert!(elapsed >= Duration::from_millis(150), "finished in {:?}", elapsed);
}

#[tokio::test]
async fn test_ceiling_is_shared_across_workflows() {
    let config = fast_config().with_max_concurrent_tasks(1);
    let (engine, recorder, _log) = test_engine(config);

    let first = Workflow::new("one", "").with_task(work("x", 30));
    let second = Workflow::new("two", "").with_task(work("y", 30));
    let first_id = engine.submit(first).await.unwrap();
    let second_id = engine.submit(second).await.unwrap();

    assert_eq!(finish(&engine, &first_id).await.status, WorkflowStatus::Completed);
    assert_eq!(finish(&engine, &second_id).await.status, WorkflowStatus::Completed);
    assert_eq!(recorder.peak(), 1);
}

#[tokio::test]
async fn test_missing_dependency_deadlocks() {
    let (engine, recorder, log) = test_engine(fast_config());
    let workflow = Workflow::new("dangling", "")
        .with_task(work("a", 0))
        .with_task(work("b", 0).depends_on("ghost"));

    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;

    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(snapshot.task("a").unwrap().status, TaskStatus::Completed);
    assert_eq!(snapshot.task("b").unwrap().status, TaskStatus::Pending);
    assert_eq!(recorder.calls("b"), 0);
    let reason = snapshot.error.unwrap();
    assert!(reason.contains("b waiting on ghost"), "{}", reason);
    assert_eq!(log.events_of(WorkflowEvent::WorkflowFailed).len(), 1);
}

#[tokio::test]
async fn test_failed_task_without_dependents_fails_workflow() {
    let (engine, _recorder, _log) = test_engine(fast_config());
    let workflow = Workflow::new("leaf failure", "")
        .with_task(work("ok", 0))
        .with_task(
            work("bad", 0)
                .with_parameter("fail_times", json!(-1))
                .with_max_retries(0),
        );

    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;

    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(snapshot.failed_tasks.len(), 1);
    assert_eq!(snapshot.failed_tasks[0].task_id, "bad");
    assert_eq!(snapshot.failed_tasks[0].attempts, 1);
    assert!(snapshot.error.unwrap().contains("tasks exhausted retries: bad"));
}

#[tokio::test]
async fn test_dependent_of_failed_task_never_runs() {
    let (engine, recorder, _log) = test_engine(fast_config());
    let workflow = Workflow::new("blocked", "")
        .with_task(
            work("a", 0)
                .with_parameter("fail_times", json!(-1))
                .with_max_retries(1),
        )
        .with_task(work("b", 0).depends_on("a"));

    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;

    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(recorder.calls("a"), 2);
    assert_eq!(recorder.calls("b"), 0);
    let reason = snapshot.error.unwrap();
    assert!(reason.contains("tasks exhausted retries: a"), "{}", reason);
    assert!(reason.contains("b waiting on a"), "{}", reason);
}

#[tokio::test]
async fn test_retry_bound() {
    let (engine, recorder, log) = test_engine(fast_config());
    let workflow = Workflow::new("always failing", "").with_task(
        work("a", 0)
            .with_parameter("fail_times", json!(-1))
            .with_max_retries(2),
    );

    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;

    assert_eq!(snapshot.status, WorkflowStatus::Failed);
    assert_eq!(recorder.calls("a"), 3);
    let a = snapshot.task("a").unwrap();
    assert_eq!(a.retry_count, 2);
    assert_eq!(a.error.as_deref(), Some("Task execution failed: attempt 2 failed on purpose"));
    assert_eq!(log.events_of(WorkflowEvent::TaskFailed).len(), 3);
}

#[tokio::test]
async fn test_retry_then_success() {
    let (engine, recorder, _log) = test_engine(fast_config());
    let workflow = Workflow::new("flaky", "")
        .with_task(work("a", 0).with_parameter("fail_times", json!(2)))
        .with_task(work("b", 0).depends_on("a"));

    let id = engine.submit(workflow).await.unwrap();
    let snapshot = finish(&engine, &id).await;

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(recorder.calls("a"), 3);
    assert_eq!(snapshot.task("a").unwrap().retry_count, 2);
    assert_eq!(snapshot.task("a").unwrap().output, Some(json!({"task": "a", "attempt": 2})));
    assert!(recorder.spans("a")[2].end <= recorder.spans("b")[0].start);
}

#[tokio::test]
async fn test_status_reports_progress_while_running() {
    let (engine, _recorder, _log) = test_engine(fast_config());
    let workflow = Workflow::new("progress", "")
        .with_task(work("a", 0))
        .with_task(work("b", 200).depends_on("a"));

    let id = engine.submit(workflow).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = engine.status(&id).await.unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::Running);
    assert_eq!(snapshot.progress.completed, 1);
    assert_eq!(snapshot.progress.running, 1);
    assert_eq!(snapshot.progress.percent, 50.0);
    assert!(snapshot.started_at.is_some());

    assert_eq!(finish(&engine, &id).await.status, WorkflowStatus::Completed);
}
