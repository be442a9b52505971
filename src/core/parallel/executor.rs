//! Parallel task executor with pluggable scheduling strategies.
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

use super::queue::{ReadyQueue, WorkerQueues};
use super::stats::{ExecutorStats, ExecutorStatistics};
use super::task::{Task, TaskOutcome, TaskStatus};
use crate::Result;
use crate::error::TaskForgeError;

/// Execution strategies for parallel task processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// First in, first out
    Fifo,
    /// Priority-based ordering
    Priority,
    /// Dependency-based ordering
    Dependency,
    /// Work-stealing per-worker queues
    WorkStealing,
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionStrategy::Fifo => "fifo",
            ExecutionStrategy::Priority => "priority",
            ExecutionStrategy::Dependency => "dependency",
            ExecutionStrategy::WorkStealing => "work_stealing",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for a [`ParallelExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of workers. 0 means one per CPU core.
    pub max_workers: usize,
    /// Scheduling strategy.
    pub strategy: ExecutionStrategy,
    /// Default timeout applied to tasks without their own.
    pub task_timeout: Option<Duration>,
    /// Idle poll interval between steal rounds.
    pub steal_poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            strategy: ExecutionStrategy::Fifo,
            task_timeout: None,
            steal_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Callback invoked at every task status transition after the initial
/// `Pending`. Receives the task id, the new status, and the value or error
/// for terminal transitions. Panics raised by the callback are logged and
/// swallowed.
pub type StatusCallback =
    Arc<dyn Fn(&str, TaskStatus, Option<&Value>, Option<&TaskForgeError>) + Send + Sync>;

/// One-shot handle resolving with the eventual outcome of a submitted task.
pub struct TaskHandle {
    task_id: String,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub(crate) fn new(task_id: String, rx: oneshot::Receiver<TaskOutcome>) -> Self {
        Self { task_id, rx }
    }

    /// Id of the task this handle belongs to.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Wait for the task to settle and return its outcome.
    pub async fn wait(self) -> TaskOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskForgeError::executor_state(format!(
                "completion channel for task {} closed",
                self.task_id
            ))),
        }
    }
}

struct Inner {
    tasks: HashMap<String, Arc<Task>>,
    deps: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
    completed: HashSet<String>,
    failed: HashSet<String>,
    cancelled: HashSet<String>,
    running: HashSet<String>,
    scheduled: HashSet<String>,
    outcomes: HashMap<String, TaskOutcome>,
    senders: HashMap<String, oneshot::Sender<TaskOutcome>>,
    shared_queue: ReadyQueue,
    worker_queues: Option<WorkerQueues>,
    seq: u64,
    paused: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            deps: HashMap::new(),
            reverse: HashMap::new(),
            completed: HashSet::new(),
            failed: HashSet::new(),
            cancelled: HashSet::new(),
            running: HashSet::new(),
            scheduled: HashSet::new(),
            outcomes: HashMap::new(),
            senders: HashMap::new(),
            shared_queue: ReadyQueue::new(),
            worker_queues: None,
            seq: 0,
            paused: false,
        }
    }

    fn is_terminal(&self, task_id: &str) -> bool {
        self.completed.contains(task_id)
            || self.failed.contains(task_id)
            || self.cancelled.contains(task_id)
    }

    fn queue_size(&self) -> usize {
        self.shared_queue.len()
            + self
                .worker_queues
                .as_ref()
                .map(|queues| queues.len())
                .unwrap_or(0)
    }

    fn get_task(&self, task_id: &str) -> Option<Arc<Task>> {
        self.tasks.get(task_id).cloned()
    }
}

struct Shared {
    strategy: ExecutionStrategy,
    max_workers: usize,
    default_timeout: Option<Duration>,
    steal_poll_interval: Duration,
    inner: Mutex<Inner>,
    stats: ExecutorStats,
    running: AtomicBool,
    work_available: Notify,
    settled: Notify,
    callback: Mutex<Option<StatusCallback>>,
}

/// Runs submitted tasks concurrently up to `max_workers`, honoring one of
/// four scheduling strategies, gating on dependencies, enforcing per-task
/// timeouts, and publishing per-transition status events.
///
/// # Dependency contract
///
/// Dependency edges are completion edges: a dependent is released only
/// after every prerequisite finishes **successfully**. When a prerequisite
/// fails, times out, or is cancelled, its dependents are cancelled
/// transitively and their handles resolve with
/// [`TaskForgeError::DependencyNotSatisfied`] naming the prerequisite.
///
/// # Cancellation
///
/// [`cancel`](Self::cancel) succeeds only while a task is still pending or
/// scheduled. Once a worker has observed the task as running it runs to its
/// natural terminal state. [`stop`](Self::stop) never interrupts running
/// computations; it drains the workers and resolves everything left in the
/// queues (or never released) as cancelled.
pub struct ParallelExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started_at: Mutex<Option<DateTime<Local>>>,
}

impl ParallelExecutor {
    /// Create an executor from the given configuration.
    pub fn new(config: ExecutorConfig) -> Self {
        let max_workers = if config.max_workers == 0 {
            num_cpus::get()
        } else {
            config.max_workers
        };
        Self {
            shared: Arc::new(Shared {
                strategy: config.strategy,
                max_workers,
                default_timeout: config.task_timeout,
                steal_poll_interval: config.steal_poll_interval,
                inner: Mutex::new(Inner::new()),
                stats: ExecutorStats::default(),
                running: AtomicBool::new(false),
                work_available: Notify::new(),
                settled: Notify::new(),
                callback: Mutex::new(None),
            }),
            workers: Mutex::new(Vec::new()),
            started_at: Mutex::new(None),
        }
    }

    /// Create an executor with default settings and the given strategy.
    pub fn with_strategy(strategy: ExecutionStrategy) -> Self {
        Self::new(ExecutorConfig {
            strategy,
            ..ExecutorConfig::default()
        })
    }

    /// Whether the executor is currently running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Resolved worker count.
    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// Configured scheduling strategy.
    pub fn strategy(&self) -> ExecutionStrategy {
        self.shared.strategy
    }

    /// Start the worker pool. Must be called inside a Tokio runtime.
    ///
    /// Fails with [`TaskForgeError::ExecutorState`] when already running.
    pub fn start(&self, callback: Option<StatusCallback>) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(TaskForgeError::executor_state(
                "executor is already running",
            ));
        }
        *self.shared.callback.lock().unwrap() = callback;
        *self.started_at.lock().unwrap() = Some(Local::now());
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.paused = false;
            if self.shared.strategy == ExecutionStrategy::WorkStealing {
                inner.worker_queues = Some(WorkerQueues::new(self.shared.max_workers));
            }
        }
        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..self.shared.max_workers {
            let shared = Arc::clone(&self.shared);
            workers.push(tokio::spawn(Self::worker_loop(shared, worker_id)));
        }
        info!(
            "Started {} workers with {} strategy",
            self.shared.max_workers, self.shared.strategy
        );
        Ok(())
    }

    /// Stop the executor: signal all workers, wait for in-flight tasks to
    /// finish, and resolve everything still queued (or never released) as
    /// cancelled. Idempotent.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            warn!("Executor is not running");
            return;
        }
        info!("Stopping executor...");
        self.shared.work_available.notify_waiters();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.await;
        }

        // Everything not terminal after the workers drained was either
        // still queued or waiting on a dependency; resolve it as cancelled.
        let leftovers: Vec<String> = {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.shared_queue.drain();
            if let Some(queues) = inner.worker_queues.as_mut() {
                queues.drain_all();
            }
            inner
                .tasks
                .keys()
                .filter(|id| !inner.is_terminal(id))
                .cloned()
                .collect()
        };
        for task_id in leftovers {
            let error = TaskForgeError::task_cancelled(&task_id);
            self.settle_cancelled(&task_id, error);
        }
        info!("Executor stopped");
    }

    /// Submit a task for execution.
    ///
    /// Registers the task's dependency edges and enqueues it when every
    /// prerequisite is already completed. Returns a handle that resolves
    /// with the task's value, error, or cancellation signal.
    pub fn submit(&self, task: Task) -> Result<TaskHandle> {
        if !self.is_running() {
            return Err(TaskForgeError::executor_state("executor is not running"));
        }
        let task = Arc::new(task);
        let task_id = task.id().to_string();
        let (tx, rx) = oneshot::channel();

        let (ready, doomed_dependency) = {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.tasks.contains_key(&task_id) {
                return Err(TaskForgeError::executor_state(format!(
                    "task {} has already been submitted",
                    task_id
                )));
            }
            inner.tasks.insert(task_id.clone(), Arc::clone(&task));
            let deps: HashSet<String> = task.dependencies().iter().cloned().collect();
            for dep in &deps {
                inner
                    .reverse
                    .entry(dep.clone())
                    .or_default()
                    .insert(task_id.clone());
            }
            let ready = deps.is_subset(&inner.completed);
            let doomed = deps
                .iter()
                .find(|dep| inner.failed.contains(*dep) || inner.cancelled.contains(*dep))
                .cloned();
            inner.deps.insert(task_id.clone(), deps);
            inner.senders.insert(task_id.clone(), tx);
            if doomed.is_none() && ready {
                inner.scheduled.insert(task_id.clone());
            }
            (ready, doomed)
        };

        self.shared.stats.record_submitted();
        if let Some(dependency) = doomed_dependency {
            // A prerequisite already failed or was cancelled before this
            // submission; the strict dependency contract applies.
            let error = TaskForgeError::dependency_not_satisfied(&task_id, dependency);
            self.settle_cancelled(&task_id, error);
        } else if ready {
            self.schedule(&task);
        }

        Ok(TaskHandle::new(task_id, rx))
    }

    /// Submit multiple tasks; handle order matches input order.
    pub fn submit_all(&self, tasks: Vec<Task>) -> Result<Vec<TaskHandle>> {
        tasks.into_iter().map(|task| self.submit(task)).collect()
    }

    /// Cancel a task that has not started running yet.
    ///
    /// Returns `true` when the task was cancelled, `false` when it is
    /// unknown, already running, or already terminal.
    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        if !self.is_running() {
            return Err(TaskForgeError::executor_state("executor is not running"));
        }
        {
            let mut inner = self.shared.inner.lock().unwrap();
            let Some(_task) = inner.get_task(task_id) else {
                warn!("Task {} not found", task_id);
                return Ok(false);
            };
            if inner.running.contains(task_id) {
                warn!("Task {} is already running and cannot be cancelled", task_id);
                return Ok(false);
            }
            if inner.is_terminal(task_id) {
                warn!("Task {} has already finished", task_id);
                return Ok(false);
            }
            inner.shared_queue.tombstone(task_id);
            if let Some(queues) = inner.worker_queues.as_mut() {
                queues.tombstone(task_id);
            }
        }
        self.settle_cancelled(task_id, TaskForgeError::task_cancelled(task_id));
        Ok(true)
    }

    /// Wait for the listed tasks to settle, up to `timeout`.
    ///
    /// Returns a map from task id to its outcome; tasks unknown or still
    /// unsettled when the timeout elapses map to `None`.
    pub async fn wait_for(
        &self,
        task_ids: &[String],
        timeout: Option<Duration>,
    ) -> HashMap<String, Option<TaskOutcome>> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let all_settled = {
                let inner = self.shared.inner.lock().unwrap();
                task_ids
                    .iter()
                    .all(|id| inner.outcomes.contains_key(id) || !inner.tasks.contains_key(id))
            };
            if all_settled {
                break;
            }
            if !self.wait_for_settle(deadline).await {
                warn!("Timeout waiting for tasks: {:?}", task_ids);
                break;
            }
        }

        let inner = self.shared.inner.lock().unwrap();
        task_ids
            .iter()
            .map(|id| (id.clone(), inner.outcomes.get(id).cloned()))
            .collect()
    }

    /// Wait for every submitted task to settle, up to `timeout`.
    ///
    /// Returns `true` when all tasks settled in time.
    pub async fn wait_all(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let all_settled = {
                let inner = self.shared.inner.lock().unwrap();
                inner
                    .tasks
                    .keys()
                    .all(|id| inner.outcomes.contains_key(id))
            };
            if all_settled {
                return true;
            }
            if !self.wait_for_settle(deadline).await {
                return false;
            }
        }
    }

    /// Wait for one settle notification or the deadline. Returns `false`
    /// when the deadline elapsed.
    async fn wait_for_settle(&self, deadline: Option<tokio::time::Instant>) -> bool {
        // The notified future is enabled before re-checking state so a
        // settle between check and await cannot be missed; a short poll
        // backstops the executor being stopped underneath us.
        let notified = self.shared.settled.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    return false;
                }
                let step = remaining.min(Duration::from_millis(50));
                tokio::time::timeout(step, notified).await.is_ok()
                    || tokio::time::Instant::now() < deadline
            }
            None => {
                let _ = tokio::time::timeout(Duration::from_millis(50), notified).await;
                true
            }
        }
    }

    /// Snapshot of executor statistics.
    pub fn statistics(&self) -> ExecutorStatistics {
        let (pending, running, queue_size) = {
            let inner = self.shared.inner.lock().unwrap();
            let terminal =
                inner.completed.len() + inner.failed.len() + inner.cancelled.len();
            let pending = inner
                .tasks
                .len()
                .saturating_sub(terminal + inner.running.len());
            (pending, inner.running.len(), inner.queue_size())
        };
        self.shared
            .stats
            .snapshot(pending, running, queue_size, *self.started_at.lock().unwrap())
    }

    /// Ids of submitted tasks that are neither running nor terminal.
    pub fn pending_task_ids(&self) -> Vec<String> {
        let inner = self.shared.inner.lock().unwrap();
        inner
            .tasks
            .keys()
            .filter(|id| !inner.is_terminal(id) && !inner.running.contains(*id))
            .cloned()
            .collect()
    }

    /// Ids of tasks currently executing.
    pub fn running_task_ids(&self) -> Vec<String> {
        self.shared
            .inner
            .lock()
            .unwrap()
            .running
            .iter()
            .cloned()
            .collect()
    }

    /// Ids of tasks that completed successfully.
    pub fn completed_task_ids(&self) -> Vec<String> {
        self.shared
            .inner
            .lock()
            .unwrap()
            .completed
            .iter()
            .cloned()
            .collect()
    }

    /// Ids of tasks that failed (including timeouts).
    pub fn failed_task_ids(&self) -> Vec<String> {
        self.shared
            .inner
            .lock()
            .unwrap()
            .failed
            .iter()
            .cloned()
            .collect()
    }

    /// Stop workers from acquiring new tasks. Running tasks continue.
    pub fn pause(&self) {
        self.shared.inner.lock().unwrap().paused = true;
    }

    /// Resume task acquisition after a pause.
    pub fn resume(&self) {
        self.shared.inner.lock().unwrap().paused = false;
        self.shared.work_available.notify_waiters();
    }

    /// Whether task acquisition is currently paused.
    pub fn is_paused(&self) -> bool {
        self.shared.inner.lock().unwrap().paused
    }

    // ------------------------------------------------------------------
    // Internal machinery
    // ------------------------------------------------------------------

    /// Mark a task scheduled, emit the transition, then enqueue it.
    ///
    /// The Scheduled callback fires before the task becomes acquirable so
    /// per-task callback delivery stays monotonic.
    fn schedule(&self, task: &Arc<Task>) {
        Self::schedule_on(&self.shared, task, false);
    }

    fn schedule_on(shared: &Arc<Shared>, task: &Arc<Task>, late_release: bool) {
        task.set_status(TaskStatus::Scheduled);
        Self::emit(shared, task.id(), TaskStatus::Scheduled, None, None);
        {
            let mut inner = shared.inner.lock().unwrap();
            if inner.is_terminal(task.id()) {
                // Cancelled between marking and enqueueing; already settled.
                return;
            }
            Self::enqueue(&mut inner, shared.strategy, task, late_release);
        }
        shared.work_available.notify_one();
    }

    fn enqueue(inner: &mut Inner, strategy: ExecutionStrategy, task: &Arc<Task>, late_release: bool) {
        inner.seq += 1;
        let seq = inner.seq;
        let task_id = task.id().to_string();
        match strategy {
            ExecutionStrategy::Fifo => inner.shared_queue.push(0, seq, task_id),
            ExecutionStrategy::Priority => {
                inner
                    .shared_queue
                    .push(task.priority().ordinal(), seq, task_id)
            }
            ExecutionStrategy::Dependency => {
                // Bias tasks that unblock many dependents toward the
                // front, clamped to the defined priority bands.
                let dependents = inner
                    .reverse
                    .get(&task_id)
                    .map(|set| set.len() as i32)
                    .unwrap_or(0);
                let band = (task.priority().ordinal() - 10 * dependents).clamp(0, 5);
                inner.shared_queue.push(band, seq, task_id)
            }
            ExecutionStrategy::WorkStealing => {
                match inner.worker_queues.as_mut() {
                    // Tasks released by a late-satisfied dependency go to
                    // the shared overflow queue workers fall back to after
                    // failed steal rounds.
                    Some(queues) if !late_release => {
                        queues.enqueue_least_loaded(task_id);
                    }
                    _ => inner.shared_queue.push(0, seq, task_id),
                }
            }
        }
    }

    async fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
        debug!("Worker {} started", worker_id);
        while shared.running.load(Ordering::SeqCst) {
            match Self::acquire_task(&shared, worker_id).await {
                Some(task) => Self::process_task(&shared, task).await,
                None => {
                    let idle = if shared.strategy == ExecutionStrategy::WorkStealing {
                        shared.steal_poll_interval
                    } else {
                        Duration::from_millis(50)
                    };
                    let notified = shared.work_available.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep(idle) => {}
                    }
                }
            }
        }
        debug!("Worker {} stopped", worker_id);
    }

    async fn acquire_task(shared: &Arc<Shared>, worker_id: usize) -> Option<Arc<Task>> {
        if shared.strategy != ExecutionStrategy::WorkStealing {
            let mut inner = shared.inner.lock().unwrap();
            if inner.paused {
                return None;
            }
            let task_id = inner.shared_queue.pop()?;
            return inner.get_task(&task_id);
        }

        // Work stealing: local queue first.
        {
            let mut inner = shared.inner.lock().unwrap();
            if inner.paused {
                return None;
            }
            if let Some(task_id) = inner
                .worker_queues
                .as_mut()
                .and_then(|queues| queues.pop_local(worker_id))
            {
                return inner.get_task(&task_id);
            }
        }

        // Then a few rounds against the busiest peer.
        for _ in 0..3 {
            {
                let mut inner = shared.inner.lock().unwrap();
                if inner.paused {
                    return None;
                }
                if let Some(task_id) = inner
                    .worker_queues
                    .as_mut()
                    .and_then(|queues| queues.steal_from_busiest(worker_id))
                {
                    shared.stats.record_steal();
                    debug!("Worker {} stole task {}", worker_id, task_id);
                    return inner.get_task(&task_id);
                }
            }
            tokio::time::sleep(shared.steal_poll_interval).await;
            if !shared.running.load(Ordering::SeqCst) {
                return None;
            }
        }

        // Finally the shared overflow queue, used for tasks whose
        // dependencies were satisfied late.
        let mut inner = shared.inner.lock().unwrap();
        if inner.paused {
            return None;
        }
        let task_id = inner.shared_queue.pop()?;
        inner.get_task(&task_id)
    }

    async fn process_task(shared: &Arc<Shared>, task: Arc<Task>) {
        let task_id = task.id().to_string();
        if task.status().is_terminal() {
            // Stale queue entry for a task cancelled after scheduling.
            return;
        }
        {
            let mut inner = shared.inner.lock().unwrap();
            inner.running.insert(task_id.clone());
            let current = inner.running.len();
            shared.stats.update_peak(current);
        }
        Self::emit(shared, &task_id, TaskStatus::Running, None, None);

        let outcome = task.run_with_deadline(shared.default_timeout).await;
        let status = task.status();

        match status {
            TaskStatus::Completed => shared
                .stats
                .record_completed(task.duration().unwrap_or_default()),
            TaskStatus::TimedOut => {
                warn!("Task {} timed out", task_id);
                shared.stats.record_timed_out();
            }
            TaskStatus::Cancelled => shared.stats.record_cancelled(),
            _ => shared.stats.record_failed(),
        }

        Self::settle(shared, &task_id, status, outcome.clone());
        match &outcome {
            Ok(value) => Self::emit(shared, &task_id, status, Some(value), None),
            Err(error) => Self::emit(shared, &task_id, status, None, Some(error)),
        }

        if status == TaskStatus::Completed {
            Self::release_dependents(shared, &task_id);
        } else {
            Self::cascade_cancel_dependents(shared, &task_id);
        }
    }

    /// Record a terminal outcome and resolve the completion handle.
    fn settle(shared: &Arc<Shared>, task_id: &str, status: TaskStatus, outcome: TaskOutcome) {
        let sender = {
            let mut inner = shared.inner.lock().unwrap();
            inner.running.remove(task_id);
            match status {
                TaskStatus::Completed => {
                    inner.completed.insert(task_id.to_string());
                }
                TaskStatus::Cancelled => {
                    inner.cancelled.insert(task_id.to_string());
                }
                _ => {
                    inner.failed.insert(task_id.to_string());
                }
            }
            inner.outcomes.insert(task_id.to_string(), outcome.clone());
            inner.senders.remove(task_id)
        };
        if let Some(tx) = sender {
            let _ = tx.send(outcome);
        }
        shared.settled.notify_waiters();
    }

    /// Mark a not-yet-running task cancelled and resolve its handle.
    fn settle_cancelled(&self, task_id: &str, error: TaskForgeError) {
        Self::settle_cancelled_on(&self.shared, task_id, error);
    }

    fn settle_cancelled_on(shared: &Arc<Shared>, task_id: &str, error: TaskForgeError) {
        let task = shared.inner.lock().unwrap().get_task(task_id);
        if let Some(task) = task {
            task.set_status(TaskStatus::Cancelled);
        }
        shared.stats.record_cancelled();
        Self::settle(shared, task_id, TaskStatus::Cancelled, Err(error.clone()));
        Self::emit(shared, task_id, TaskStatus::Cancelled, None, Some(&error));
        Self::cascade_cancel_dependents(shared, task_id);
    }

    /// Enqueue dependents whose prerequisites are now all completed.
    fn release_dependents(shared: &Arc<Shared>, task_id: &str) {
        let released: Vec<Arc<Task>> = {
            let mut inner = shared.inner.lock().unwrap();
            let dependents: Vec<String> = inner
                .reverse
                .get(task_id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            let mut released = Vec::new();
            for dependent_id in dependents {
                if inner.is_terminal(&dependent_id)
                    || inner.running.contains(&dependent_id)
                    || inner.scheduled.contains(&dependent_id)
                {
                    continue;
                }
                let satisfied = inner
                    .deps
                    .get(&dependent_id)
                    .map(|deps| deps.is_subset(&inner.completed))
                    .unwrap_or(false);
                if satisfied && let Some(task) = inner.get_task(&dependent_id) {
                    inner.scheduled.insert(dependent_id.clone());
                    released.push(task);
                }
            }
            released
        };
        for task in released {
            Self::schedule_on(shared, &task, true);
        }
    }

    /// Transitively cancel dependents of a failed or cancelled prerequisite.
    fn cascade_cancel_dependents(shared: &Arc<Shared>, task_id: &str) {
        let mut worklist: Vec<(String, String)> = {
            let inner = shared.inner.lock().unwrap();
            inner
                .reverse
                .get(task_id)
                .map(|set| {
                    set.iter()
                        .map(|dep| (dep.clone(), task_id.to_string()))
                        .collect()
                })
                .unwrap_or_default()
        };

        while let Some((dependent_id, prerequisite)) = worklist.pop() {
            let cancel = {
                let mut inner = shared.inner.lock().unwrap();
                if inner.is_terminal(&dependent_id) || inner.running.contains(&dependent_id) {
                    false
                } else {
                    inner.shared_queue.tombstone(&dependent_id);
                    if let Some(queues) = inner.worker_queues.as_mut() {
                        queues.tombstone(&dependent_id);
                    }
                    if let Some(task) = inner.get_task(&dependent_id) {
                        task.set_status(TaskStatus::Cancelled);
                    }
                    true
                }
            };
            if !cancel {
                continue;
            }
            let error =
                TaskForgeError::dependency_not_satisfied(&dependent_id, &prerequisite);
            shared.stats.record_cancelled();
            Self::settle(shared, &dependent_id, TaskStatus::Cancelled, Err(error.clone()));
            Self::emit(shared, &dependent_id, TaskStatus::Cancelled, None, Some(&error));

            let next: Vec<(String, String)> = {
                let inner = shared.inner.lock().unwrap();
                inner
                    .reverse
                    .get(&dependent_id)
                    .map(|set| {
                        set.iter()
                            .map(|dep| (dep.clone(), dependent_id.clone()))
                            .collect()
                    })
                    .unwrap_or_default()
            };
            worklist.extend(next);
        }
    }

    /// Invoke the status callback, swallowing panics.
    fn emit(
        shared: &Arc<Shared>,
        task_id: &str,
        status: TaskStatus,
        value: Option<&Value>,
        error: Option<&TaskForgeError>,
    ) {
        let callback = shared.callback.lock().unwrap().clone();
        if let Some(callback) = callback
            && std::panic::catch_unwind(AssertUnwindSafe(|| {
                callback(task_id, status, value, error)
            }))
            .is_err()
        {
            warn!("Status callback panicked for task {}", task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value_task(id: &str, value: i64) -> Task {
        Task::builder()
            .id(id)
            .build(async move { Ok(json!(value)) })
    }

    fn executor(strategy: ExecutionStrategy, max_workers: usize) -> ParallelExecutor {
        ParallelExecutor::new(ExecutorConfig {
            max_workers,
            strategy,
            ..ExecutorConfig::default()
        })
    }

    #[tokio::test]
    async fn test_submit_requires_running_executor() {
        let exec = executor(ExecutionStrategy::Fifo, 2);
        let result = exec.submit(value_task("early", 1));
        assert!(matches!(
            result,
            Err(TaskForgeError::ExecutorState { .. })
        ));
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let exec = executor(ExecutionStrategy::Fifo, 2);
        exec.start(None).unwrap();
        assert!(exec.start(None).is_err());
        exec.stop().await;
    }

    #[tokio::test]
    async fn test_double_stop_is_noop() {
        let exec = executor(ExecutionStrategy::Fifo, 2);
        exec.start(None).unwrap();
        exec.stop().await;
        exec.stop().await;
        assert!(!exec.is_running());
    }

    #[tokio::test]
    async fn test_simple_completion() {
        let exec = executor(ExecutionStrategy::Fifo, 4);
        exec.start(None).unwrap();
        let handle = exec.submit(value_task("one", 41)).unwrap();
        assert_eq!(handle.wait().await.unwrap(), json!(41));
        let stats = exec.statistics();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
        exec.stop().await;
    }

    #[tokio::test]
    async fn test_failure_does_not_affect_siblings() {
        let exec = executor(ExecutionStrategy::Fifo, 2);
        exec.start(None).unwrap();
        let bad = exec
            .submit(Task::builder().id("bad").build(async {
                Err(TaskForgeError::task_failed("bad", "exploded"))
            }))
            .unwrap();
        let good = exec.submit(value_task("good", 7)).unwrap();
        assert!(bad.wait().await.is_err());
        assert_eq!(good.wait().await.unwrap(), json!(7));
        let stats = exec.statistics();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        exec.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_pending_task() {
        let exec = executor(ExecutionStrategy::Fifo, 1);
        exec.start(None).unwrap();
        exec.pause();
        let handle = exec.submit(value_task("victim", 1)).unwrap();
        assert!(exec.cancel("victim").unwrap());
        // Cancel on a terminal task returns false.
        assert!(!exec.cancel("victim").unwrap());
        let outcome = handle.wait().await;
        assert!(matches!(
            outcome,
            Err(TaskForgeError::TaskCancelled { .. })
        ));
        exec.resume();
        exec.stop().await;
    }

    #[tokio::test]
    async fn test_dependency_failure_cascades() {
        let exec = executor(ExecutionStrategy::Dependency, 2);
        exec.start(None).unwrap();
        let parent = exec
            .submit(Task::builder().id("parent").build(async {
                Err(TaskForgeError::task_failed("parent", "nope"))
            }))
            .unwrap();
        let child = exec
            .submit(
                Task::builder()
                    .id("child")
                    .dependency("parent")
                    .build(async { Ok(json!(1)) }),
            )
            .unwrap();
        assert!(parent.wait().await.is_err());
        let child_outcome = child.wait().await;
        assert!(matches!(
            child_outcome,
            Err(TaskForgeError::DependencyNotSatisfied { .. })
        ));
        exec.stop().await;
    }

    #[tokio::test]
    async fn test_submit_after_dependency_already_failed() {
        let exec = executor(ExecutionStrategy::Dependency, 2);
        exec.start(None).unwrap();
        let parent = exec
            .submit(Task::builder().id("p").build(async {
                Err(TaskForgeError::task_failed("p", "nope"))
            }))
            .unwrap();
        assert!(parent.wait().await.is_err());
        let late = exec
            .submit(
                Task::builder()
                    .id("late")
                    .dependency("p")
                    .build(async { Ok(json!(1)) }),
            )
            .unwrap();
        assert!(matches!(
            late.wait().await,
            Err(TaskForgeError::DependencyNotSatisfied { .. })
        ));
        exec.stop().await;
    }

    #[tokio::test]
    async fn test_statistics_quiescent_invariant() {
        let exec = executor(ExecutionStrategy::Fifo, 2);
        exec.start(None).unwrap();
        let handles = exec
            .submit_all(vec![
                value_task("a", 1),
                value_task("b", 2),
                value_task("c", 3),
            ])
            .unwrap();
        for handle in handles {
            handle.wait().await.unwrap();
        }
        let stats = exec.statistics();
        assert_eq!(
            stats.submitted,
            stats.completed
                + stats.failed
                + stats.cancelled
                + stats.pending as u64
                + stats.running as u64
        );
        exec.stop().await;
    }

    #[tokio::test]
    async fn test_wait_for_reports_unsettled_as_none() {
        let exec = executor(ExecutionStrategy::Fifo, 1);
        exec.start(None).unwrap();
        let _slow = exec
            .submit(Task::builder().id("slow").build(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(json!(1))
            }))
            .unwrap();
        let results = exec
            .wait_for(
                &["slow".to_string(), "missing".to_string()],
                Some(Duration::from_millis(50)),
            )
            .await;
        assert!(results["slow"].is_none());
        // Unknown ids settle immediately as absent.
        assert!(results["missing"].is_none());
        exec.stop().await;
    }
}
