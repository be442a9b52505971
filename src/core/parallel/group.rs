//! Named task collections executed as a unit.
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::task::{Task, TaskOutcome};
use crate::Result;

/// A group of related tasks that can be managed together.
///
/// Task groups are a standalone utility for small fan-outs: members run
/// directly on the current runtime, sequentially by default or concurrently
/// with `parallel = true`, without going through the executor. Results are
/// captured per member id.
///
/// # Examples
///
/// ```rust,ignore
/// use taskforge::core::parallel::{Task, TaskGroup};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let mut group = TaskGroup::new("warmup");
/// group.add_task(Arc::new(Task::builder().id("a").build(async { Ok(json!(1)) })));
/// group.add_task(Arc::new(Task::builder().id("b").build(async { Ok(json!(2)) })));
/// let values = group.execute_tasks(true, false).await?;
/// assert_eq!(values.len(), 2);
/// ```
pub struct TaskGroup {
    id: String,
    name: String,
    tasks: Vec<Arc<Task>>,
    results: Mutex<HashMap<String, TaskOutcome>>,
}

impl TaskGroup {
    /// Create an empty group with a generated id.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            tasks: Vec::new(),
            results: Mutex::new(HashMap::new()),
        }
    }

    /// Create a group with an explicit id and initial members.
    pub fn with_tasks<S: Into<String>>(name: S, tasks: Vec<Arc<Task>>) -> Self {
        let mut group = Self::new(name);
        for task in tasks {
            group.add_task(task);
        }
        group
    }

    /// Group identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Group display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of member tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Add a task unless a member with the same id already exists.
    pub fn add_task(&mut self, task: Arc<Task>) {
        if !self.has_task(task.id()) {
            self.tasks.push(task);
        }
    }

    /// Remove a member by id.
    pub fn remove_task(&mut self, task_id: &str) {
        self.tasks.retain(|task| task.id() != task_id);
    }

    /// Look up a member by id.
    pub fn get_task(&self, task_id: &str) -> Option<Arc<Task>> {
        self.tasks
            .iter()
            .find(|task| task.id() == task_id)
            .cloned()
    }

    /// Whether the group contains a member with the given id.
    pub fn has_task(&self, task_id: &str) -> bool {
        self.tasks.iter().any(|task| task.id() == task_id)
    }

    /// Execute all member tasks.
    ///
    /// With `parallel = false` members run sequentially in insertion order;
    /// with `parallel = true` they run concurrently on the current runtime.
    /// With `continue_on_error = true` failures are captured in the results
    /// map and skipped; otherwise the first failure is returned (members
    /// already started still record their outcomes).
    ///
    /// Returns the values of the members that completed successfully.
    pub async fn execute_tasks(
        &self,
        parallel: bool,
        continue_on_error: bool,
    ) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        let mut first_error = None;

        if parallel {
            let runs = self.tasks.iter().map(|task| {
                let task = Arc::clone(task);
                async move {
                    let outcome = task.run().await;
                    (task.id().to_string(), outcome)
                }
            });
            for (task_id, outcome) in futures::future::join_all(runs).await {
                self.record(&task_id, &outcome);
                match outcome {
                    Ok(value) => values.push(value),
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }
        } else {
            for task in &self.tasks {
                let outcome = task.run().await;
                self.record(task.id(), &outcome);
                match outcome {
                    Ok(value) => values.push(value),
                    Err(err) => {
                        if !continue_on_error {
                            return Err(err);
                        }
                    }
                }
            }
        }

        if let Some(err) = first_error
            && !continue_on_error
        {
            return Err(err);
        }
        Ok(values)
    }

    fn record(&self, task_id: &str, outcome: &TaskOutcome) {
        self.results
            .lock()
            .unwrap()
            .insert(task_id.to_string(), outcome.clone());
    }

    /// Captured per-member outcomes from the last execution.
    pub fn results(&self) -> HashMap<String, TaskOutcome> {
        self.results.lock().unwrap().clone()
    }

    /// JSON summary of the group and its members.
    pub fn describe(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "tasks": self.tasks.iter().map(|t| t.describe()).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaskGroup({}, {}, tasks={})",
            self.id,
            self.name,
            self.tasks.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parallel::task::TaskStatus;
    use crate::error::TaskForgeError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn value_task(id: &str, value: Value) -> Arc<Task> {
        Arc::new(Task::builder().id(id).build(async move { Ok(value) }))
    }

    #[test]
    fn test_membership_management() {
        let mut group = TaskGroup::new("members");
        group.add_task(value_task("a", json!(1)));
        group.add_task(value_task("a", json!(1)));
        group.add_task(value_task("b", json!(2)));
        assert_eq!(group.len(), 2);
        assert!(group.has_task("a"));
        group.remove_task("a");
        assert!(!group.has_task("a"));
        assert!(group.get_task("b").is_some());
    }

    #[tokio::test]
    async fn test_sequential_execution_preserves_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut group = TaskGroup::new("ordered");
        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            group.add_task(Arc::new(Task::builder().id(name).build(async move {
                log.lock().unwrap().push(name.to_string());
                Ok(json!(name))
            })));
        }
        let values = group.execute_tasks(false, false).await.unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first", "second", "third"]
        );
    }

    #[tokio::test]
    async fn test_parallel_execution_runs_all() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new("parallel");
        for i in 0..4 {
            let counter = Arc::clone(&counter);
            group.add_task(Arc::new(Task::builder().id(format!("t{}", i)).build(
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(i))
                },
            )));
        }
        let values = group.execute_tasks(true, false).await.unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_sequential_stops_on_error() {
        let mut group = TaskGroup::new("abort");
        group.add_task(value_task("ok", json!(1)));
        group.add_task(Arc::new(Task::builder().id("bad").build(async {
            Err(TaskForgeError::task_failed("bad", "nope"))
        })));
        group.add_task(value_task("after", json!(2)));
        let result = group.execute_tasks(false, false).await;
        assert!(result.is_err());
        // The member after the failure never ran.
        assert_eq!(
            group.get_task("after").unwrap().status(),
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_continue_on_error_captures_failures() {
        let mut group = TaskGroup::new("capture");
        group.add_task(value_task("ok", json!(1)));
        group.add_task(Arc::new(Task::builder().id("bad").build(async {
            Err(TaskForgeError::task_failed("bad", "nope"))
        })));
        group.add_task(value_task("also-ok", json!(2)));
        let values = group.execute_tasks(false, true).await.unwrap();
        assert_eq!(values, vec![json!(1), json!(2)]);
        let results = group.results();
        assert!(results["bad"].is_err());
        assert_eq!(results["ok"].as_ref().unwrap(), &json!(1));
    }
}
