use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskforge::core::parallel::{StatusCallback, Task, TaskPriority, TaskStatus};
use taskforge::error::TaskForgeError;

/// Initialize test logging once per process.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Task that immediately resolves with a JSON value.
#[allow(dead_code)]
pub fn value_task(id: &str, value: Value) -> Task {
    Task::builder().id(id).build(async move { Ok(value) })
}

/// Task that sleeps before resolving with a JSON value.
#[allow(dead_code)]
pub fn sleep_task(id: &str, millis: u64, value: Value) -> Task {
    Task::builder().id(id).build(async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(value)
    })
}

/// Task that appends its id to a shared execution log.
#[allow(dead_code)]
pub fn order_task(id: &str, priority: TaskPriority, log: Arc<Mutex<Vec<String>>>) -> Task {
    let name = id.to_string();
    Task::builder()
        .id(id)
        .priority(priority)
        .build(async move {
            log.lock().unwrap().push(name.clone());
            Ok(json!(name))
        })
}

/// Task that bumps a shared counter.
#[allow(dead_code)]
pub fn counter_task(id: &str, counter: Arc<AtomicUsize>) -> Task {
    Task::builder().id(id).build(async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!(null))
    })
}

/// Task that fails with the given message.
#[allow(dead_code)]
pub fn failing_task(id: &str, message: &str) -> Task {
    let task_id = id.to_string();
    let message = message.to_string();
    Task::builder()
        .id(id)
        .build(async move { Err(TaskForgeError::task_failed(task_id, message)) })
}

/// Records `(task_id, status)` pairs from the executor's status callback.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct StatusLog {
    entries: Arc<Mutex<Vec<(String, TaskStatus)>>>,
}

#[allow(dead_code)]
impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> StatusCallback {
        let entries = Arc::clone(&self.entries);
        Arc::new(move |task_id, status, _value, _error| {
            entries.lock().unwrap().push((task_id.to_string(), status));
        })
    }

    pub fn entries(&self) -> Vec<(String, TaskStatus)> {
        self.entries.lock().unwrap().clone()
    }

    /// Statuses observed for one task, in delivery order.
    pub fn statuses_for(&self, task_id: &str) -> Vec<TaskStatus> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, status)| *status)
            .collect()
    }
}
