//! Task definition and utilities for parallel processing
use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::error::TaskForgeError;

/// Result of a task computation: an opaque JSON value or a typed failure.
pub type TaskOutcome = Result<Value, TaskForgeError>;

/// One-shot boxed future holding the deferred computation of a task.
pub type TaskFuture = BoxFuture<'static, TaskOutcome>;

/// Priority levels for tasks. Lower ordinal drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Normal = 3,
    Low = 4,
    Background = 5,
}

impl TaskPriority {
    /// Numeric ordinal used by the priority queues.
    pub fn ordinal(&self) -> i32 {
        *self as i32
    }

    /// Map an ordinal back to a priority, clamping to the defined band range.
    pub fn from_ordinal(value: i32) -> TaskPriority {
        match value.clamp(0, 5) {
            0 => TaskPriority::Critical,
            1 => TaskPriority::High,
            2 => TaskPriority::Medium,
            3 => TaskPriority::Normal,
            4 => TaskPriority::Low,
            _ => TaskPriority::Background,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
            TaskPriority::Background => "background",
        };
        write!(f, "{}", name)
    }
}

/// Status of a task.
///
/// Statuses progress `Pending → Scheduled → Running` and finish in exactly
/// one of the terminal states. Once terminal, a task never re-enters a
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Task has been created but not started
    Pending,
    /// Task has been placed on a ready queue
    Scheduled,
    /// Task is currently running
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed with an error
    Failed,
    /// Task was cancelled before completion
    Cancelled,
    /// Task exceeded its deadline
    TimedOut,
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::TimedOut
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::TimedOut => "timed_out",
        };
        write!(f, "{}", name)
    }
}

struct TaskState {
    status: TaskStatus,
    started_at: Option<DateTime<Local>>,
    finished_at: Option<DateTime<Local>>,
}

/// A unit of deferred work in the parallel processing system.
///
/// A task carries identity, priority, dependency ids, an optional timeout,
/// opaque metadata, and the computation itself as a one-shot future. Status
/// and timing are written only by the context that runs the task; external
/// code observes the outcome through the completion handle returned at
/// submission.
///
/// # Examples
///
/// ```rust,ignore
/// use taskforge::core::parallel::{Task, TaskPriority};
/// use serde_json::json;
///
/// let task = Task::builder()
///     .id("fetch-42")
///     .priority(TaskPriority::High)
///     .dependency("login")
///     .build(async { Ok(json!({"status": "ok"})) });
/// ```
pub struct Task {
    id: String,
    name: String,
    priority: TaskPriority,
    dependencies: Vec<String>,
    timeout: Option<Duration>,
    metadata: HashMap<String, Value>,
    created_at: DateTime<Local>,
    work: Mutex<Option<TaskFuture>>,
    state: Mutex<TaskState>,
}

impl Task {
    /// Create a task with a generated id and default settings.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        TaskBuilder::new().build(future)
    }

    /// Start building a task.
    pub fn builder() -> TaskBuilder {
        TaskBuilder::new()
    }

    /// Stable identity of this task.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scheduling priority.
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Ids of tasks that must complete before this one may start.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Per-task timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Opaque caller-supplied metadata.
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Current status of the task.
    pub fn status(&self) -> TaskStatus {
        self.state.lock().unwrap().status
    }

    /// Wall-clock time of the first transition into `Running`.
    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.state.lock().unwrap().started_at
    }

    /// Wall-clock time of the transition into a terminal state.
    pub fn finished_at(&self) -> Option<DateTime<Local>> {
        self.state.lock().unwrap().finished_at
    }

    /// Execution duration, available once the task is terminal.
    pub fn duration(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        match (state.started_at, state.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }

    /// Transition the task to a new status, stamping timing fields.
    ///
    /// The start time is set exactly once on the first transition into
    /// `Running`; the end time exactly once on the first terminal
    /// transition. Transitions out of a terminal state are ignored.
    pub(crate) fn set_status(&self, status: TaskStatus) {
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = status;
        if status == TaskStatus::Running && state.started_at.is_none() {
            state.started_at = Some(Local::now());
        }
        if status.is_terminal() && state.finished_at.is_none() {
            state.finished_at = Some(Local::now());
        }
    }

    /// Take the one-shot work future. Returns `None` on a second call.
    pub(crate) fn take_work(&self) -> Option<TaskFuture> {
        self.work.lock().unwrap().take()
    }

    /// Run the task to completion, honoring its own timeout.
    ///
    /// Used by [`TaskGroup`](super::TaskGroup) for small fan-outs that do
    /// not go through the executor; the executor's workers run tasks with
    /// [`run_with_deadline`](Self::run_with_deadline) so a pool-wide
    /// default timeout can apply.
    pub async fn run(&self) -> TaskOutcome {
        self.run_with_deadline(None).await
    }

    /// Run the task with an optional fallback deadline.
    ///
    /// The effective deadline is the task's own timeout when set,
    /// otherwise `default_timeout`, otherwise none. On expiry the future
    /// is dropped, the task is marked `TimedOut`, and a timeout error is
    /// returned.
    pub(crate) async fn run_with_deadline(&self, default_timeout: Option<Duration>) -> TaskOutcome {
        let Some(work) = self.take_work() else {
            return Err(TaskForgeError::executor_state(format!(
                "task {} has already been started",
                self.id
            )));
        };
        self.set_status(TaskStatus::Running);

        let effective = self.timeout.or(default_timeout);
        let outcome = match effective {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(TaskForgeError::task_timeout(&self.id, limit)),
            },
            None => work.await,
        };

        match &outcome {
            Ok(_) => self.set_status(TaskStatus::Completed),
            Err(TaskForgeError::TaskTimeout { .. }) => self.set_status(TaskStatus::TimedOut),
            Err(TaskForgeError::TaskCancelled { .. })
            | Err(TaskForgeError::DependencyNotSatisfied { .. }) => {
                self.set_status(TaskStatus::Cancelled)
            }
            Err(_) => self.set_status(TaskStatus::Failed),
        }
        outcome
    }

    /// Snapshot of status and timing for monitoring.
    pub fn report(&self) -> TaskReport {
        let state = self.state.lock().unwrap();
        TaskReport {
            task_id: self.id.clone(),
            name: self.name.clone(),
            status: state.status,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// JSON summary of the task for diagnostics and logging.
    pub fn describe(&self) -> Value {
        let report = self.report();
        let mut value = serde_json::json!({
            "id": self.id,
            "name": self.name,
            "status": report.status.to_string(),
            "priority": self.priority.to_string(),
            "dependencies": self.dependencies,
            "created_at": self.created_at.to_rfc3339(),
        });
        if let Some(start) = report.started_at {
            value["started_at"] = Value::String(start.to_rfc3339());
        }
        if let Some(end) = report.finished_at {
            value["finished_at"] = Value::String(end.to_rfc3339());
        }
        if let Some(duration) = report.duration() {
            value["duration_seconds"] = serde_json::json!(duration.as_secs_f64());
        }
        value
    }
}

impl PartialEq for Task {
    /// Tasks are equal when their ids are equal.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task({}, {}, priority={}, status={})",
            self.id,
            self.name,
            self.priority,
            self.status()
        )
    }
}

/// Snapshot of a task's status and timing.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Identifier of the task
    pub task_id: String,
    /// Human-readable task name
    pub name: String,
    /// Status at snapshot time
    pub status: TaskStatus,
    /// First transition into `Running`, if any
    pub started_at: Option<DateTime<Local>>,
    /// Transition into a terminal state, if any
    pub finished_at: Option<DateTime<Local>>,
}

impl TaskReport {
    /// Whether the task completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Whether the task finished in a failed state (including timeout).
    pub fn is_failure(&self) -> bool {
        matches!(self.status, TaskStatus::Failed | TaskStatus::TimedOut)
    }

    /// Execution duration when both timestamps are set.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// Builder for [`Task`] instances.
pub struct TaskBuilder {
    id: Option<String>,
    name: Option<String>,
    priority: TaskPriority,
    dependencies: Vec<String>,
    timeout: Option<Duration>,
    metadata: HashMap<String, Value>,
}

impl TaskBuilder {
    /// Create a builder with default settings (normal priority, no
    /// dependencies, no timeout).
    pub fn new() -> Self {
        Self {
            id: None,
            name: None,
            priority: TaskPriority::Normal,
            dependencies: Vec::new(),
            timeout: None,
            metadata: HashMap::new(),
        }
    }

    /// Set a stable task id. A UUID is generated when omitted.
    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a display name. Defaults to `task-<id prefix>`.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the scheduling priority.
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a single prerequisite task id.
    pub fn dependency<S: Into<String>>(mut self, id: S) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Add several prerequisite task ids.
    pub fn dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Set a per-task timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a metadata entry.
    pub fn metadata<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Finish the builder with the task's computation.
    pub fn build<F>(self, future: F) -> Task
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = self
            .name
            .unwrap_or_else(|| format!("task-{}", id.chars().take(8).collect::<String>()));
        Task {
            id,
            name,
            priority: self.priority,
            dependencies: self.dependencies,
            timeout: self.timeout,
            metadata: self.metadata,
            created_at: Local::now(),
            work: Mutex::new(Some(Box::pin(future))),
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                started_at: None,
                finished_at: None,
            }),
        }
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
