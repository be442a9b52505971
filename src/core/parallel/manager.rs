//! High-level management interface for parallel processing.
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use super::executor::{
    ExecutionStrategy, ExecutorConfig, ParallelExecutor, StatusCallback, TaskHandle,
};
use super::task::{Task, TaskOutcome};
use crate::Result;
use crate::error::TaskForgeError;

/// Strategies for parallel processing.
///
/// The manager-level alias over the executor's scheduling strategies, plus
/// batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStrategy {
    /// Simple parallel processing
    Parallel,
    /// Batch processing
    Batched,
    /// Priority-based processing
    Priority,
    /// Dependency graph-based processing
    Graph,
    /// Priority + dependency graph (priority is encoded per task)
    PriorityGraph,
    /// Work-stealing queues
    WorkStealing,
}

impl ProcessingStrategy {
    /// Map this processing strategy onto an executor strategy.
    pub fn execution_strategy(&self) -> ExecutionStrategy {
        match self {
            ProcessingStrategy::Parallel | ProcessingStrategy::Batched => ExecutionStrategy::Fifo,
            ProcessingStrategy::Priority => ExecutionStrategy::Priority,
            ProcessingStrategy::Graph | ProcessingStrategy::PriorityGraph => {
                ExecutionStrategy::Dependency
            }
            ProcessingStrategy::WorkStealing => ExecutionStrategy::WorkStealing,
        }
    }
}

impl std::fmt::Display for ProcessingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProcessingStrategy::Parallel => "parallel",
            ProcessingStrategy::Batched => "batched",
            ProcessingStrategy::Priority => "priority",
            ProcessingStrategy::Graph => "graph",
            ProcessingStrategy::PriorityGraph => "priority_graph",
            ProcessingStrategy::WorkStealing => "work_stealing",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for a [`ParallelManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of workers. 0 means one per CPU core.
    pub max_workers: usize,
    /// Processing strategy.
    pub strategy: ProcessingStrategy,
    /// Default timeout applied to tasks without their own.
    pub task_timeout: Option<Duration>,
    /// Number of tasks accumulated before a batch is flushed.
    pub batch_size: usize,
    /// Idle poll interval for work-stealing workers.
    pub steal_poll_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            strategy: ProcessingStrategy::Parallel,
            task_timeout: None,
            batch_size: 10,
            steal_poll_interval: Duration::from_millis(10),
        }
    }
}

impl ManagerConfig {
    /// Construct a manager configuration from the application config.
    pub fn from_app_config(config: &crate::config::Config) -> Self {
        Self {
            max_workers: config.general.max_workers,
            strategy: config.parallel.strategy,
            task_timeout: config.general.task_timeout(),
            batch_size: config.parallel.batch_size,
            steal_poll_interval: Duration::from_millis(config.parallel.steal_poll_interval_ms),
        }
    }
}

/// Statistics about a processing session.
#[derive(Debug, Clone, Default)]
pub struct ProcessingStatistics {
    /// Tasks accepted for execution
    pub submitted: u64,
    /// Tasks that finished successfully
    pub completed: u64,
    /// Tasks that failed, including timeouts
    pub failed: u64,
    /// Tasks cancelled before running
    pub cancelled: u64,
    /// Tasks that exceeded their deadline
    pub timed_out: u64,
    /// Submitted tasks not yet running or terminal
    pub pending: usize,
    /// Tasks currently executing
    pub running: usize,
    /// Entries currently sitting in ready queues
    pub queue_size: usize,
    /// Highest simultaneous running-task count observed
    pub max_concurrent: usize,
    /// Average completed-task duration
    pub avg_duration: Duration,
    /// Wall-clock time the session has been running
    pub total_duration: Duration,
    /// Cross-worker steal count under the work-stealing strategy
    pub work_stealing_transfers: u64,
}

struct BatchSlot {
    task: Task,
    tx: oneshot::Sender<TaskOutcome>,
}

#[derive(Default)]
struct SessionTimer {
    started_at: Option<Instant>,
    accumulated: Duration,
}

impl SessionTimer {
    fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    fn stop(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.accumulated += started.elapsed();
        }
    }

    fn total(&self) -> Duration {
        self.accumulated
            + self
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default()
    }

    fn has_started(&self) -> bool {
        self.started_at.is_some() || !self.accumulated.is_zero()
    }
}

/// Public façade over [`ParallelExecutor`].
///
/// Translates a [`ProcessingStrategy`] into the executor's scheduling
/// strategy, offers submit-and-await helpers, accumulates session timing,
/// and exposes advisory pause/resume.
///
/// # Batched mode
///
/// Under [`ProcessingStrategy::Batched`] submissions accumulate into a
/// pending batch. The batch is flushed when it reaches `batch_size` or when
/// [`wait_all`](Self::wait_all) is called; handles returned for an
/// unflushed batch stay pending until then.
///
/// # Examples
///
/// ```rust,ignore
/// use taskforge::core::parallel::{ManagerConfig, ParallelManager, Task};
/// use serde_json::json;
///
/// let manager = ParallelManager::new(ManagerConfig::default());
/// manager.start(None)?;
/// let value = manager
///     .submit_and_await(Task::new(async { Ok(json!("done")) }))
///     .await?;
/// manager.stop().await;
/// ```
pub struct ParallelManager {
    config: ManagerConfig,
    executor: Arc<ParallelExecutor>,
    current_batch: Mutex<Vec<BatchSlot>>,
    running: AtomicBool,
    paused: AtomicBool,
    session: Mutex<SessionTimer>,
}

impl ParallelManager {
    /// Create a manager with the given configuration.
    pub fn new(config: ManagerConfig) -> Self {
        let executor = ParallelExecutor::new(ExecutorConfig {
            max_workers: config.max_workers,
            strategy: config.strategy.execution_strategy(),
            task_timeout: config.task_timeout,
            steal_poll_interval: config.steal_poll_interval,
        });
        Self {
            config,
            executor: Arc::new(executor),
            current_batch: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            session: Mutex::new(SessionTimer::default()),
        }
    }

    /// Create a manager from the application configuration.
    pub fn from_app_config(config: &crate::config::Config) -> Self {
        Self::new(ManagerConfig::from_app_config(config))
    }

    /// Configured processing strategy.
    pub fn strategy(&self) -> ProcessingStrategy {
        self.config.strategy
    }

    /// Whether the manager is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether task acquisition is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Start the manager and its executor.
    pub fn start(&self, callback: Option<StatusCallback>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Parallel manager is already running");
            return Ok(());
        }
        self.paused.store(false, Ordering::SeqCst);
        self.session.lock().unwrap().start();
        self.executor.start(callback)?;
        info!(
            "Parallel manager started with strategy: {}",
            self.config.strategy
        );
        Ok(())
    }

    /// Stop the manager and its executor.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Parallel manager is not running");
            return;
        }
        info!("Stopping parallel manager...");
        self.executor.stop().await;
        self.session.lock().unwrap().stop();
        info!("Parallel manager stopped");
    }

    /// Pause task acquisition. Running tasks continue; newly submitted
    /// tasks stay queued until [`resume`](Self::resume). Idempotent.
    pub fn pause(&self) {
        if !self.is_running() {
            warn!("Parallel manager is not running");
            return;
        }
        if self.paused.swap(true, Ordering::SeqCst) {
            warn!("Parallel manager is already paused");
            return;
        }
        self.executor.pause();
        info!("Parallel manager paused");
    }

    /// Resume task acquisition after a pause. A no-op with a warning when
    /// not paused.
    pub fn resume(&self) {
        if !self.is_running() {
            warn!("Parallel manager is not running");
            return;
        }
        if !self.paused.swap(false, Ordering::SeqCst) {
            warn!("Parallel manager is not paused");
            return;
        }
        self.executor.resume();
        info!("Parallel manager resumed");
    }

    /// Submit a task for execution.
    ///
    /// Under the batched strategy the task joins the pending batch and the
    /// returned handle settles only when the batch is flushed.
    pub fn submit(&self, task: Task) -> Result<TaskHandle> {
        if !self.is_running() {
            return Err(TaskForgeError::executor_state(
                "parallel manager is not running",
            ));
        }
        if self.is_paused() {
            warn!("Parallel manager is paused, task will be queued but not executed");
        }

        if self.config.strategy != ProcessingStrategy::Batched {
            return self.executor.submit(task);
        }

        let task_id = task.id().to_string();
        let (tx, rx) = oneshot::channel();
        let full_batch = {
            let mut batch = self.current_batch.lock().unwrap();
            batch.push(BatchSlot { task, tx });
            if batch.len() >= self.config.batch_size {
                Some(std::mem::take(&mut *batch))
            } else {
                None
            }
        };
        if let Some(batch) = full_batch {
            let executor = Arc::clone(&self.executor);
            tokio::spawn(Self::flush_batch(executor, batch));
        }
        Ok(TaskHandle::new(task_id, rx))
    }

    /// Submit multiple tasks; handle order matches input order.
    pub fn submit_many(&self, tasks: Vec<Task>) -> Result<Vec<TaskHandle>> {
        tasks.into_iter().map(|task| self.submit(task)).collect()
    }

    /// Submit a task and wait for its outcome.
    pub async fn submit_and_await(&self, task: Task) -> TaskOutcome {
        self.submit(task)?.wait().await
    }

    /// Submit multiple tasks and wait for all outcomes, in input order.
    pub async fn submit_and_await_many(&self, tasks: Vec<Task>) -> Result<Vec<TaskOutcome>> {
        let handles = self.submit_many(tasks)?;
        let outcomes =
            futures::future::join_all(handles.into_iter().map(|handle| handle.wait())).await;
        Ok(outcomes)
    }

    /// Cancel a task that has not started running yet.
    ///
    /// Tasks still sitting in an unflushed batch are cancelled locally;
    /// everything else is delegated to the executor.
    pub fn cancel_task(&self, task_id: &str) -> Result<bool> {
        if !self.is_running() {
            return Err(TaskForgeError::executor_state(
                "parallel manager is not running",
            ));
        }
        let slot = {
            let mut batch = self.current_batch.lock().unwrap();
            batch
                .iter()
                .position(|slot| slot.task.id() == task_id)
                .map(|index| batch.remove(index))
        };
        if let Some(slot) = slot {
            let _ = slot
                .tx
                .send(Err(TaskForgeError::task_cancelled(task_id)));
            return Ok(true);
        }
        self.executor.cancel(task_id)
    }

    /// Wait for the listed tasks to settle, up to `timeout`.
    pub async fn wait_for_tasks(
        &self,
        task_ids: &[String],
        timeout: Option<Duration>,
    ) -> Result<HashMap<String, Option<TaskOutcome>>> {
        if !self.is_running() {
            return Err(TaskForgeError::executor_state(
                "parallel manager is not running",
            ));
        }
        Ok(self.executor.wait_for(task_ids, timeout).await)
    }

    /// Flush any pending batch and wait for every submitted task to
    /// settle, up to `timeout`. Returns `true` when everything settled.
    pub async fn wait_all(&self, timeout: Option<Duration>) -> Result<bool> {
        if !self.is_running() {
            return Err(TaskForgeError::executor_state(
                "parallel manager is not running",
            ));
        }
        let pending_batch = std::mem::take(&mut *self.current_batch.lock().unwrap());
        if !pending_batch.is_empty() {
            Self::flush_batch(Arc::clone(&self.executor), pending_batch).await;
        }
        Ok(self.executor.wait_all(timeout).await)
    }

    /// Ids of submitted tasks that are neither running nor terminal.
    pub fn get_pending_tasks(&self) -> Result<Vec<String>> {
        if !self.is_running() {
            return Err(TaskForgeError::executor_state(
                "parallel manager is not running",
            ));
        }
        Ok(self.executor.pending_task_ids())
    }

    /// Ids of tasks currently executing.
    pub fn get_running_tasks(&self) -> Result<Vec<String>> {
        if !self.is_running() {
            return Err(TaskForgeError::executor_state(
                "parallel manager is not running",
            ));
        }
        Ok(self.executor.running_task_ids())
    }

    /// Snapshot of processing statistics for this session.
    pub fn get_statistics(&self) -> ProcessingStatistics {
        let (has_started, session_total) = {
            let session = self.session.lock().unwrap();
            (session.has_started(), session.total())
        };
        if !has_started {
            return ProcessingStatistics::default();
        }
        let stats = self.executor.statistics();
        ProcessingStatistics {
            submitted: stats.submitted,
            completed: stats.completed,
            failed: stats.failed,
            cancelled: stats.cancelled,
            timed_out: stats.timed_out,
            pending: stats.pending,
            running: stats.running,
            queue_size: stats.queue_size,
            max_concurrent: stats.peak_concurrent,
            avg_duration: stats.avg_processing,
            total_duration: session_total,
            work_stealing_transfers: stats.work_stealing_transfers,
        }
    }

    /// Submit every batched task, gather the outcomes, and complete each
    /// original handle with its respective outcome.
    async fn flush_batch(executor: Arc<ParallelExecutor>, batch: Vec<BatchSlot>) {
        let mut waits = Vec::new();
        for slot in batch {
            match executor.submit(slot.task) {
                Ok(handle) => waits.push((slot.tx, handle)),
                Err(error) => {
                    let _ = slot.tx.send(Err(error));
                }
            }
        }
        futures::future::join_all(waits.into_iter().map(|(tx, handle)| async move {
            let outcome = handle.wait().await;
            let _ = tx.send(outcome);
        }))
        .await;
    }
}
