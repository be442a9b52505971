//! Comprehensive error types for TaskForge operations.
//!
//! This module defines the `TaskForgeError` enum covering all error
//! conditions that can occur during task scheduling, cache access, and
//! error-report generation, together with helper constructors.
use std::time::Duration;
use thiserror::Error;

/// Represents all possible errors in the TaskForge crate.
///
/// Each variant provides specific context to facilitate debugging and
/// user-friendly reporting. The enum is `Clone` because task outcomes are
/// delivered both to the submitter's completion handle and to the
/// executor's settled-outcome map consulted by `wait_for`.
///
/// # Examples
///
/// ```rust
/// use taskforge::error::{TaskForgeError, TaskForgeResult};
///
/// fn example() -> TaskForgeResult<()> {
///     Err(TaskForgeError::config("missing cache directory"))
/// }
/// ```
#[derive(Error, Debug, Clone)]
pub enum TaskForgeError {
    /// Configuration error due to invalid or missing settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Cache key was empty or otherwise malformed.
    #[error("Invalid cache key: {message}")]
    CacheKey {
        /// Description of the key problem
        message: String,
    },

    /// Cache value was rejected (null values cannot be stored).
    #[error("Invalid cache value: {message}")]
    CacheValue {
        /// Description of the value problem
        message: String,
    },

    /// Cache configuration was rejected (e.g. zero `max_size`).
    #[error("Invalid cache configuration: {message}")]
    CacheConfig {
        /// Description of the configuration problem
        message: String,
    },

    /// File read/write or serialization failure inside a cache backend.
    #[error("Cache backend I/O error: {message}")]
    CacheIo {
        /// Description of the backend failure
        message: String,
    },

    /// A task's computation returned an error.
    #[error("Task {task_id} failed: {message}")]
    TaskFailed {
        /// Identifier of the failed task
        task_id: String,
        /// Failure description captured from the computation
        message: String,
    },

    /// A task exceeded its effective deadline.
    #[error("Task {task_id} timed out after {timeout:?}")]
    TaskTimeout {
        /// Identifier of the timed-out task
        task_id: String,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// A task was cancelled before or instead of running.
    #[error("Task {task_id} was cancelled")]
    TaskCancelled {
        /// Identifier of the cancelled task
        task_id: String,
    },

    /// A prerequisite of this task failed or was cancelled, so the task
    /// itself was cancelled transitively.
    #[error("Task {task_id} dependency not satisfied: {dependency}")]
    DependencyNotSatisfied {
        /// Identifier of the cancelled dependent task
        task_id: String,
        /// Identifier of the prerequisite that did not complete
        dependency: String,
    },

    /// Lifecycle precondition violated (submit/cancel while stopped,
    /// double start, and similar).
    #[error("Executor state error: {message}")]
    ExecutorState {
        /// Description of the lifecycle violation
        message: String,
    },

    /// I/O failure outside the cache backends (e.g. report files).
    #[error("I/O error: {message}")]
    Io {
        /// Description of the underlying I/O failure
        message: String,
    },

    /// Catch-all error variant wrapping any other failure.
    #[error("Unknown error: {0}")]
    Other(String),
}

/// Coarse error classification used by the suggestion registry and by
/// report file naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    CacheKey,
    CacheValue,
    CacheConfig,
    CacheIo,
    TaskFailed,
    TaskTimeout,
    TaskCancelled,
    DependencyNotSatisfied,
    ExecutorState,
    Io,
    Other,
}

impl ErrorKind {
    /// Stable name of this kind, used in report file names.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Config => "Config",
            ErrorKind::CacheKey => "CacheKey",
            ErrorKind::CacheValue => "CacheValue",
            ErrorKind::CacheConfig => "CacheConfig",
            ErrorKind::CacheIo => "CacheIo",
            ErrorKind::TaskFailed => "TaskFailed",
            ErrorKind::TaskTimeout => "TaskTimeout",
            ErrorKind::TaskCancelled => "TaskCancelled",
            ErrorKind::DependencyNotSatisfied => "DependencyNotSatisfied",
            ErrorKind::ExecutorState => "ExecutorState",
            ErrorKind::Io => "Io",
            ErrorKind::Other => "Other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// Convert std I/O errors into the generic I/O variant. Cache backends
// re-wrap with cache_io at their own boundary.
impl From<std::io::Error> for TaskForgeError {
    fn from(err: std::io::Error) -> Self {
        TaskForgeError::Io {
            message: err.to_string(),
        }
    }
}

// Convert serialization failures to cache backend errors; the on-disk
// entry records are the only place serde_json can fail at runtime.
impl From<serde_json::Error> for TaskForgeError {
    fn from(err: serde_json::Error) -> Self {
        TaskForgeError::CacheIo {
            message: format!("JSON serialization/deserialization error: {}", err),
        }
    }
}

// Convert config crate error to configuration error
impl From<config::ConfigError> for TaskForgeError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => TaskForgeError::Config {
                message: format!("Configuration file not found: {}", path),
            },
            config::ConfigError::Message(msg) => TaskForgeError::Config { message: msg },
            _ => TaskForgeError::Config {
                message: format!("Configuration error: {}", err),
            },
        }
    }
}

// Convert directory walking error to cache backend error
impl From<walkdir::Error> for TaskForgeError {
    fn from(err: walkdir::Error) -> Self {
        TaskForgeError::CacheIo {
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for TaskForgeError {
    fn from(err: anyhow::Error) -> Self {
        TaskForgeError::Other(err.to_string())
    }
}

/// Specialized `Result` type for TaskForge operations.
pub type TaskForgeResult<T> = Result<T, TaskForgeError>;

impl TaskForgeError {
    /// Create a configuration error with the given message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use taskforge::error::TaskForgeError;
    /// let err = TaskForgeError::config("invalid setting");
    /// assert_eq!(err.to_string(), "Configuration error: invalid setting");
    /// ```
    pub fn config<S: Into<String>>(message: S) -> Self {
        TaskForgeError::Config {
            message: message.into(),
        }
    }

    /// Create an invalid-cache-key error with the given message.
    pub fn cache_key<S: Into<String>>(message: S) -> Self {
        TaskForgeError::CacheKey {
            message: message.into(),
        }
    }

    /// Create an invalid-cache-value error with the given message.
    pub fn cache_value<S: Into<String>>(message: S) -> Self {
        TaskForgeError::CacheValue {
            message: message.into(),
        }
    }

    /// Create an invalid-cache-configuration error with the given message.
    pub fn cache_config<S: Into<String>>(message: S) -> Self {
        TaskForgeError::CacheConfig {
            message: message.into(),
        }
    }

    /// Create a cache backend I/O error with the given message.
    pub fn cache_io<S: Into<String>>(message: S) -> Self {
        TaskForgeError::CacheIo {
            message: message.into(),
        }
    }

    /// Create a task execution failure error with task ID and reason.
    pub fn task_failed<S1, S2>(task_id: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        TaskForgeError::TaskFailed {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    /// Create a task timeout error with task ID and exceeded deadline.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use taskforge::error::TaskForgeError;
    /// # use std::time::Duration;
    /// let err = TaskForgeError::task_timeout("t1", Duration::from_millis(100));
    /// assert!(err.to_string().contains("t1"));
    /// ```
    pub fn task_timeout<S: Into<String>>(task_id: S, timeout: Duration) -> Self {
        TaskForgeError::TaskTimeout {
            task_id: task_id.into(),
            timeout,
        }
    }

    /// Create a task cancellation error for the given task ID.
    pub fn task_cancelled<S: Into<String>>(task_id: S) -> Self {
        TaskForgeError::TaskCancelled {
            task_id: task_id.into(),
        }
    }

    /// Create a dependency-not-satisfied error for a dependent task and
    /// the prerequisite that did not complete.
    pub fn dependency_not_satisfied<S1, S2>(task_id: S1, dependency: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        TaskForgeError::DependencyNotSatisfied {
            task_id: task_id.into(),
            dependency: dependency.into(),
        }
    }

    /// Create an executor lifecycle error with the given message.
    pub fn executor_state<S: Into<String>>(message: S) -> Self {
        TaskForgeError::ExecutorState {
            message: message.into(),
        }
    }

    /// Return the coarse classification of this error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use taskforge::error::{ErrorKind, TaskForgeError};
    /// assert_eq!(TaskForgeError::config("x").kind(), ErrorKind::Config);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskForgeError::Config { .. } => ErrorKind::Config,
            TaskForgeError::CacheKey { .. } => ErrorKind::CacheKey,
            TaskForgeError::CacheValue { .. } => ErrorKind::CacheValue,
            TaskForgeError::CacheConfig { .. } => ErrorKind::CacheConfig,
            TaskForgeError::CacheIo { .. } => ErrorKind::CacheIo,
            TaskForgeError::TaskFailed { .. } => ErrorKind::TaskFailed,
            TaskForgeError::TaskTimeout { .. } => ErrorKind::TaskTimeout,
            TaskForgeError::TaskCancelled { .. } => ErrorKind::TaskCancelled,
            TaskForgeError::DependencyNotSatisfied { .. } => ErrorKind::DependencyNotSatisfied,
            TaskForgeError::ExecutorState { .. } => ErrorKind::ExecutorState,
            TaskForgeError::Io { .. } => ErrorKind::Io,
            TaskForgeError::Other(_) => ErrorKind::Other,
        }
    }
}
