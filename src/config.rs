//! Configuration management module for TaskForge.
//!
//! Provides the [`Config`] structure aggregating all runtime settings for
//! the execution core, the cache backends, and error reporting, together
//! with TOML file and environment variable loading and validation.
//!
//! # Examples
//!
//! ```rust
//! use taskforge::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! assert_eq!(config.cache.ttl_seconds, 3600);
//! let toml_str = toml::to_string(&config)?;
//! assert!(toml_str.contains("[parallel]"));
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;
use crate::core::parallel::ProcessingStrategy;
use crate::error::TaskForgeError;
use crate::reporting::ReportFormat;

/// Full application configuration for TaskForge.
///
/// This struct aggregates general runtime options, parallel execution
/// parameters, cache behavior, and error reporting settings.
///
/// # Serialization
///
/// This struct can be serialized to/from TOML format for configuration
/// files and accepts `TASKFORGE_`-prefixed environment overrides, e.g.
/// `TASKFORGE_GENERAL__MAX_WORKERS=8`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// General runtime options (worker count, default timeout).
    pub general: GeneralConfig,
    /// Parallel processing parameters.
    pub parallel: ParallelConfig,
    /// Cache backend behavior.
    pub cache: CacheSettings,
    /// Error reporting options.
    pub reporting: ReportingConfig,
}

/// General runtime configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Maximum number of concurrent workers. 0 means one per CPU core.
    pub max_workers: usize,
    /// Default task timeout in seconds. 0 means no deadline.
    pub task_timeout_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            task_timeout_seconds: 0,
        }
    }
}

impl GeneralConfig {
    /// Resolved worker count: the configured value, or the CPU count when 0.
    pub fn effective_max_workers(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get()
        } else {
            self.max_workers
        }
    }

    /// Resolved default task timeout; `None` when disabled.
    pub fn task_timeout(&self) -> Option<Duration> {
        if self.task_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.task_timeout_seconds))
        }
    }
}

/// Parallel processing configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ParallelConfig {
    /// Processing strategy applied by the manager.
    pub strategy: ProcessingStrategy,
    /// Batch size for the batched strategy.
    pub batch_size: usize,
    /// Idle poll interval for work-stealing workers, in milliseconds.
    pub steal_poll_interval_ms: u64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            strategy: ProcessingStrategy::Parallel,
            batch_size: 10,
            steal_poll_interval_ms: 10,
        }
    }
}

/// Cache behavior configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheSettings {
    /// Root directory for the file backend. `None` resolves to the
    /// platform cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Default time-to-live in seconds. 0 means entries never expire.
    pub ttl_seconds: u64,
    /// Maximum number of entries per namespace.
    pub max_size: usize,
    /// Whether cache statistics are tracked.
    pub enable_stats: bool,
    /// Whether a failing `get_or_set` producer also drops the stale key.
    pub invalidate_on_error: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            ttl_seconds: 3600,
            max_size: 1000,
            enable_stats: true,
            invalidate_on_error: false,
        }
    }
}

impl CacheSettings {
    /// Resolved cache root: the configured directory, the platform cache
    /// directory, or the system temp directory as a last resort.
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("taskforge")
        })
    }
}

/// Error reporting configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReportingConfig {
    /// Directory receiving file-based error reports.
    pub output_dir: PathBuf,
    /// Report file format.
    pub format: ReportFormat,
    /// Whether console reports use ANSI colors.
    pub colored_output: bool,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("error_reports"),
            format: ReportFormat::Json,
            colored_output: true,
        }
    }
}

impl Config {
    /// Load configuration from the default file location (if present) and
    /// `TASKFORGE_`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        Self::build(Self::default_config_path().as_deref())
    }

    /// Load configuration from an explicit TOML file plus environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(Some(path))
    }

    /// Default configuration file path under the platform config directory.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskforge").join("config.toml"))
    }

    fn build(file: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("TASKFORGE")
                .separator("__")
                .try_parsing(true),
        );
        let loaded: Config = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate configuration values for correctness.
    pub fn validate(&self) -> Result<()> {
        if self.parallel.batch_size == 0 {
            return Err(TaskForgeError::config("batch_size must be greater than 0"));
        }
        if self.parallel.steal_poll_interval_ms == 0 {
            return Err(TaskForgeError::config(
                "steal_poll_interval_ms must be greater than 0",
            ));
        }
        if self.cache.max_size == 0 {
            return Err(TaskForgeError::config(
                "cache max_size must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Serialize this configuration to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TaskForgeError::config(format!("TOML serialization error: {}", e)))
    }
}
