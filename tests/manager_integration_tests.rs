//! Manager façade integration tests
//! Strategy mapping, batching behavior, pause/resume, and statistics.

mod common;

use common::{counter_task, sleep_task, value_task};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskforge::core::parallel::{ManagerConfig, ParallelManager, ProcessingStrategy, Task};
use taskforge::error::TaskForgeError;

fn manager(strategy: ProcessingStrategy) -> ParallelManager {
    ParallelManager::new(ManagerConfig {
        max_workers: 4,
        strategy,
        batch_size: 4,
        ..ManagerConfig::default()
    })
}

#[tokio::test]
async fn test_submit_and_await_many_preserves_order() {
    common::init_logger();
    let manager = manager(ProcessingStrategy::Parallel);
    manager.start(None).unwrap();

    let tasks: Vec<Task> = (0..6)
        .map(|i| sleep_task(&format!("m{}", i), 30, json!(i)))
        .collect();
    let outcomes = manager.submit_and_await_many(tasks).await.unwrap();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        assert_eq!(outcome.unwrap(), json!(i));
    }
    manager.stop().await;
}

#[tokio::test]
async fn test_batched_handles_stay_pending_until_flush() {
    common::init_logger();
    let manager = manager(ProcessingStrategy::Batched);
    manager.start(None).unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    // Two submissions against a batch size of four: nothing runs yet.
    let h1 = manager
        .submit(counter_task("b1", Arc::clone(&counter)))
        .unwrap();
    let h2 = manager
        .submit(counter_task("b2", Arc::clone(&counter)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    // wait_all flushes the partial batch.
    assert!(manager.wait_all(Some(Duration::from_secs(2))).await.unwrap());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    h1.wait().await.unwrap();
    h2.wait().await.unwrap();
    manager.stop().await;
}

#[tokio::test]
async fn test_batched_full_batch_flushes_automatically() {
    common::init_logger();
    let manager = manager(ProcessingStrategy::Batched);
    manager.start(None).unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        handles.push(
            manager
                .submit(value_task(&format!("auto{}", i), json!(i)))
                .unwrap(),
        );
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait().await.unwrap(), json!(i));
    }
    manager.stop().await;
}

#[tokio::test]
async fn test_pause_is_advisory() {
    common::init_logger();
    let manager = manager(ProcessingStrategy::Parallel);
    manager.start(None).unwrap();
    manager.pause();

    let counter = Arc::new(AtomicUsize::new(0));
    manager
        .submit(counter_task("held", Arc::clone(&counter)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    // Paused: the task stays queued.
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(manager.get_pending_tasks().unwrap().len(), 1);

    manager.resume();
    assert!(manager.wait_all(Some(Duration::from_secs(2))).await.unwrap());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    manager.stop().await;
}

#[tokio::test]
async fn test_lifecycle_preconditions() {
    common::init_logger();
    let manager = manager(ProcessingStrategy::Parallel);
    assert!(matches!(
        manager.cancel_task("nope"),
        Err(TaskForgeError::ExecutorState { .. })
    ));
    assert!(matches!(
        manager.wait_all(None).await,
        Err(TaskForgeError::ExecutorState { .. })
    ));
    assert!(matches!(
        manager.get_pending_tasks(),
        Err(TaskForgeError::ExecutorState { .. })
    ));
}

#[tokio::test]
async fn test_statistics_track_session() {
    common::init_logger();
    let manager = manager(ProcessingStrategy::Parallel);
    manager.start(None).unwrap();

    let tasks: Vec<Task> = (0..3)
        .map(|i| sleep_task(&format!("st{}", i), 40, json!(i)))
        .collect();
    manager.submit_and_await_many(tasks).await.unwrap();

    let stats = manager.get_statistics();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 0);
    assert!(stats.avg_duration >= Duration::from_millis(30));
    assert!(stats.total_duration >= Duration::from_millis(40));
    manager.stop().await;

    // Totals freeze after stop.
    let frozen = manager.get_statistics();
    let first = frozen.total_duration;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.get_statistics().total_duration, first);
}

#[tokio::test]
async fn test_priority_graph_combines_priority_and_dependencies() {
    common::init_logger();
    let manager = ParallelManager::new(ManagerConfig {
        max_workers: 1,
        strategy: ProcessingStrategy::PriorityGraph,
        ..ManagerConfig::default()
    });
    manager.start(None).unwrap();

    let root = Task::builder().id("root").build(async { Ok(json!("root")) });
    let dependent = Task::builder()
        .id("dependent")
        .dependency("root")
        .build(async { Ok(json!("dependent")) });
    let handles = manager.submit_many(vec![dependent, root]).unwrap();
    for handle in handles {
        handle.wait().await.unwrap();
    }
    assert_eq!(manager.get_statistics().completed, 2);
    manager.stop().await;
}
