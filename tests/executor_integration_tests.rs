//! Executor integration tests
//! Lifecycle, strategy ordering, dependency gating, timeouts, and
//! cancellation across the executor's public surface.

mod common;

use common::{StatusLog, failing_task, order_task, sleep_task, value_task};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskforge::core::parallel::{
    ExecutionStrategy, ExecutorConfig, ParallelExecutor, Task, TaskPriority, TaskStatus,
};
use taskforge::error::TaskForgeError;

fn executor(strategy: ExecutionStrategy, max_workers: usize) -> ParallelExecutor {
    ParallelExecutor::new(ExecutorConfig {
        max_workers,
        strategy,
        ..ExecutorConfig::default()
    })
}

/// FIFO smoke test: three sleeping tasks complete with their own values.
#[tokio::test]
async fn test_fifo_simple_completion() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Fifo, 4);
    exec.start(None).unwrap();

    let mut handles = Vec::new();
    for i in 0..3 {
        let handle = exec
            .submit(sleep_task(&format!("t{}", i), 100, json!(i)))
            .unwrap();
        handles.push(handle);
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait().await.unwrap(), json!(i));
    }

    let stats = exec.statistics();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 0);
    assert!(stats.peak_concurrent <= 3);
    exec.stop().await;
}

/// Priority ordering with one worker: the critical task runs before the
/// low-priority one.
#[tokio::test]
async fn test_priority_ordering_single_worker() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Priority, 1);
    exec.start(None).unwrap();
    // Pause acquisition so all four tasks are queued before any runs.
    exec.pause();

    let log = Arc::new(Mutex::new(Vec::new()));
    let priorities = [
        (TaskPriority::Low, "low"),
        (TaskPriority::Normal, "normal"),
        (TaskPriority::High, "high"),
        (TaskPriority::Critical, "critical"),
    ];
    let mut handles = Vec::new();
    for (priority, name) in priorities {
        handles.push(exec.submit(order_task(name, priority, Arc::clone(&log))).unwrap());
    }
    exec.resume();
    for handle in handles {
        handle.wait().await.unwrap();
    }

    let order = log.lock().unwrap().clone();
    assert_eq!(order, vec!["critical", "high", "normal", "low"]);
    exec.stop().await;
}

/// Dependency chain A -> B -> C plus A -> D, submitted in reverse order.
#[tokio::test]
async fn test_dependency_chain_order() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Dependency, 2);
    exec.start(None).unwrap();

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let task = |id: &str, deps: &[&str]| {
        let log = Arc::clone(&log);
        let name = id.to_string();
        Task::builder()
            .id(id)
            .dependencies(deps.iter().copied())
            .build(async move {
                log.lock().unwrap().push(name.clone());
                Ok(json!(name))
            })
    };

    let handles = exec
        .submit_all(vec![
            task("C", &["B"]),
            task("D", &["A"]),
            task("B", &["A"]),
            task("A", &[]),
        ])
        .unwrap();
    for handle in handles {
        handle.wait().await.unwrap();
    }

    let order = log.lock().unwrap().clone();
    let pos = |name: &str| order.iter().position(|x| x == name).unwrap();
    assert_eq!(pos("A"), 0);
    assert!(pos("B") < pos("C"));
    assert!(pos("A") < pos("D"));
    assert_eq!(order.len(), 4);
    exec.stop().await;
}

/// A 500 ms task with a 100 ms timeout resolves with a timeout error.
#[tokio::test]
async fn test_timeout_marks_task_timed_out() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Fifo, 2);
    exec.start(None).unwrap();

    let task = Task::builder()
        .id("sleepy")
        .timeout(Duration::from_millis(100))
        .build(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(json!("never"))
        });
    let handle = exec.submit(task).unwrap();
    let outcome = handle.wait().await;
    match outcome {
        Err(TaskForgeError::TaskTimeout { task_id, timeout }) => {
            assert_eq!(task_id, "sleepy");
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected timeout error, got {:?}", other),
    }

    let stats = exec.statistics();
    assert_eq!(stats.timed_out, 1);
    assert!(stats.failed >= 1);
    exec.stop().await;
}

/// The executor-wide default timeout applies to tasks without their own.
#[tokio::test]
async fn test_executor_default_timeout() {
    common::init_logger();
    let exec = ParallelExecutor::new(ExecutorConfig {
        max_workers: 1,
        strategy: ExecutionStrategy::Fifo,
        task_timeout: Some(Duration::from_millis(80)),
        ..ExecutorConfig::default()
    });
    exec.start(None).unwrap();
    let handle = exec.submit(sleep_task("slow", 400, json!(1))).unwrap();
    assert!(matches!(
        handle.wait().await,
        Err(TaskForgeError::TaskTimeout { .. })
    ));
    exec.stop().await;
}

/// Status callbacks for a task arrive serially and monotonically.
#[tokio::test]
async fn test_status_callback_progression() {
    common::init_logger();
    let log = StatusLog::new();
    let exec = executor(ExecutionStrategy::Fifo, 2);
    exec.start(Some(log.callback())).unwrap();

    exec.submit(value_task("observed", json!(1)))
        .unwrap()
        .wait()
        .await
        .unwrap();
    exec.stop().await;

    let statuses = log.statuses_for("observed");
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Scheduled,
            TaskStatus::Running,
            TaskStatus::Completed
        ]
    );
}

/// A panicking status callback is swallowed and the task still settles.
#[tokio::test]
async fn test_panicking_callback_is_swallowed() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Fifo, 2);
    exec.start(Some(Arc::new(|_, _, _, _| panic!("bad callback"))))
        .unwrap();
    let outcome = exec
        .submit(value_task("sturdy", json!(5)))
        .unwrap()
        .wait()
        .await;
    assert_eq!(outcome.unwrap(), json!(5));
    exec.stop().await;
}

/// Tasks forming a dependency cycle never run; stop resolves them as
/// cancelled.
#[tokio::test]
async fn test_dependency_cycle_never_runs() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Dependency, 2);
    exec.start(None).unwrap();

    let cyclic = |id: &str, dep: &str| {
        Task::builder()
            .id(id)
            .dependency(dep)
            .build(async { Ok(json!("unreachable")) })
    };
    let handles = exec
        .submit_all(vec![
            cyclic("x", "z"),
            cyclic("y", "x"),
            cyclic("z", "y"),
        ])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(exec.statistics().completed, 0);
    assert_eq!(exec.pending_task_ids().len(), 3);

    exec.stop().await;
    for handle in handles {
        assert!(matches!(
            handle.wait().await,
            Err(TaskForgeError::TaskCancelled { .. })
        ));
    }
}

/// A failed prerequisite cancels its transitive dependents with a
/// distinguished cause.
#[tokio::test]
async fn test_transitive_dependency_cancellation() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Dependency, 2);
    exec.start(None).unwrap();

    let root = exec.submit(failing_task("root", "boom")).unwrap();
    let mid = exec
        .submit(
            Task::builder()
                .id("mid")
                .dependency("root")
                .build(async { Ok(json!(1)) }),
        )
        .unwrap();
    let leaf = exec
        .submit(
            Task::builder()
                .id("leaf")
                .dependency("mid")
                .build(async { Ok(json!(2)) }),
        )
        .unwrap();

    assert!(root.wait().await.is_err());
    match mid.wait().await {
        Err(TaskForgeError::DependencyNotSatisfied { dependency, .. }) => {
            assert_eq!(dependency, "root");
        }
        other => panic!("expected dependency error, got {:?}", other),
    }
    match leaf.wait().await {
        Err(TaskForgeError::DependencyNotSatisfied { dependency, .. }) => {
            assert_eq!(dependency, "mid");
        }
        other => panic!("expected dependency error, got {:?}", other),
    }

    let stats = exec.statistics();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cancelled, 2);
    exec.stop().await;
}

/// Stop cancels everything still queued without interrupting running
/// computations.
#[tokio::test]
async fn test_stop_resolves_queued_tasks() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Fifo, 1);
    exec.start(None).unwrap();

    let running = exec.submit(sleep_task("running", 200, json!("done"))).unwrap();
    // Give the single worker time to pick up the first task.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let queued = exec.submit(sleep_task("queued", 10, json!("never"))).unwrap();

    exec.stop().await;
    assert_eq!(running.wait().await.unwrap(), json!("done"));
    assert!(matches!(
        queued.wait().await,
        Err(TaskForgeError::TaskCancelled { .. })
    ));
}

/// wait_all reports completion of every submitted task within a timeout.
#[tokio::test]
async fn test_wait_all() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Fifo, 4);
    exec.start(None).unwrap();
    for i in 0..5 {
        exec.submit(sleep_task(&format!("w{}", i), 20, json!(i)))
            .unwrap();
    }
    assert!(exec.wait_all(Some(Duration::from_secs(2))).await);
    assert!(exec.wait_all(Some(Duration::from_millis(10))).await);
    exec.stop().await;
}

/// wait_for with a short timeout leaves slow tasks unsettled.
#[tokio::test]
async fn test_wait_for_timeout() {
    common::init_logger();
    let exec = executor(ExecutionStrategy::Fifo, 2);
    exec.start(None).unwrap();
    exec.submit(value_task("fast", json!(1))).unwrap();
    exec.submit(sleep_task("slow", 500, json!(2))).unwrap();

    let results = exec
        .wait_for(
            &["fast".to_string(), "slow".to_string()],
            Some(Duration::from_millis(150)),
        )
        .await;
    assert_eq!(
        results["fast"].as_ref().unwrap().as_ref().unwrap(),
        &json!(1)
    );
    assert!(results["slow"].is_none());
    exec.stop().await;
}
