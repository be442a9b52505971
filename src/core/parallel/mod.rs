//! Parallel task execution core.
//!
//! This module provides the task scheduling and execution framework at the
//! heart of TaskForge: a bounded worker pool draining strategy-specific
//! ready queues, with dependency gating, cooperative cancellation, per-task
//! timeouts, and live statistics.
//!
//! # Core Features
//!
//! ## Scheduling strategies
//! - **FIFO**: one shared queue in enqueue order
//! - **Priority**: six priority bands, FIFO within a band
//! - **Dependency**: tasks that unblock many dependents drain first
//! - **Work stealing**: per-worker queues; idle workers steal from the
//!   busiest peer
//!
//! ## Dependency management
//! - Dependents are released only when every prerequisite **completed**
//! - Failed, timed-out, or cancelled prerequisites cancel their dependents
//!   transitively with a distinguished cause
//!
//! ## Lifecycle
//! - Cooperative cancellation of not-yet-running tasks via tombstones
//! - Timeouts race the computation and drop it on expiry
//! - `stop` drains workers and resolves queued tasks as cancelled without
//!   interrupting running computations
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ ParallelManager  │────▶│ ParallelExecutor │────▶│  Ready queues   │
//! │  - strategies    │     │  - worker pool   │     │  - shared heap  │
//! │  - batching      │     │  - dep. gating   │     │  - per-worker   │
//! │  - pause/resume  │     │  - callbacks     │     │  - tombstones   │
//! └──────────────────┘     └──────────────────┘     └─────────────────┘
//!          │                        │
//!          ▼                        ▼
//!    TaskHandle (oneshot)     ExecutorStatistics
//! ```
//!
//! # Usage Examples
//!
//! ## Basic task execution
//!
//! ```rust,ignore
//! use taskforge::core::parallel::{ManagerConfig, ParallelManager, Task, TaskPriority};
//! use serde_json::json;
//!
//! let manager = ParallelManager::new(ManagerConfig::default());
//! manager.start(None)?;
//!
//! let task = Task::builder()
//!     .id("analyze-home")
//!     .priority(TaskPriority::High)
//!     .build(async { Ok(json!({"score": 87})) });
//!
//! let value = manager.submit_and_await(task).await?;
//! println!("analysis result: {value}");
//! manager.stop().await;
//! ```
//!
//! ## Dependency graphs
//!
//! ```rust,ignore
//! use taskforge::core::parallel::{ManagerConfig, ParallelManager, ProcessingStrategy, Task};
//! use serde_json::json;
//!
//! let manager = ParallelManager::new(ManagerConfig {
//!     strategy: ProcessingStrategy::Graph,
//!     ..ManagerConfig::default()
//! });
//! manager.start(None)?;
//!
//! let fetch = Task::builder().id("fetch").build(async { Ok(json!("html")) });
//! let parse = Task::builder()
//!     .id("parse")
//!     .dependency("fetch")
//!     .build(async { Ok(json!("dom")) });
//!
//! let handles = manager.submit_many(vec![parse, fetch])?;
//! manager.wait_all(None).await?;
//! ```
//!
//! # Thread Safety
//!
//! The manager and executor are safe to call from any thread after
//! `start`. Internal maps are guarded by a single brief lock, statistics
//! counters are atomics, and no lock is held across an await point.

pub mod executor;
pub mod group;
pub mod manager;
mod queue;
pub mod stats;
pub mod task;

pub use executor::{
    ExecutionStrategy, ExecutorConfig, ParallelExecutor, StatusCallback, TaskHandle,
};
pub use group::TaskGroup;
pub use manager::{ManagerConfig, ParallelManager, ProcessingStatistics, ProcessingStrategy};
pub use stats::ExecutorStatistics;
pub use task::{Task, TaskBuilder, TaskFuture, TaskOutcome, TaskPriority, TaskReport, TaskStatus};
