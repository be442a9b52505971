//! Abstract cache backend interface and shared cache types.
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::Result;
use crate::error::TaskForgeError;

/// A cache key: a single string or a tuple of strings.
///
/// Compound keys render as their parts joined with `_`, which is also how
/// they are hashed by the file backend.
///
/// # Examples
///
/// ```rust
/// use taskforge::core::cache::CacheKey;
///
/// let simple = CacheKey::from("page-audit");
/// let compound = CacheKey::from(vec!["audit".to_string(), "example.com".to_string()]);
/// assert_eq!(compound.to_string(), "audit_example.com");
/// assert!(simple.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheKey {
    /// Plain string key
    Single(String),
    /// Tuple key; collides only when every part matches
    Compound(Vec<String>),
}

impl CacheKey {
    /// Reject empty keys.
    pub fn validate(&self) -> Result<()> {
        let empty = match self {
            CacheKey::Single(key) => key.is_empty(),
            CacheKey::Compound(parts) => parts.is_empty() || parts.iter().all(|p| p.is_empty()),
        };
        if empty {
            Err(TaskForgeError::cache_key("cache key cannot be empty"))
        } else {
            Ok(())
        }
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey::Single(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey::Single(key)
    }
}

impl From<Vec<String>> for CacheKey {
    fn from(parts: Vec<String>) -> Self {
        CacheKey::Compound(parts)
    }
}

impl From<&[&str]> for CacheKey {
    fn from(parts: &[&str]) -> Self {
        CacheKey::Compound(parts.iter().map(|p| p.to_string()).collect())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Single(key) => write!(f, "{}", key),
            CacheKey::Compound(parts) => write!(f, "{}", parts.join("_")),
        }
    }
}

/// Configuration for cache behavior.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time to live in seconds. 0 means entries never expire.
    pub ttl: u64,
    /// Maximum number of items per namespace.
    pub max_size: usize,
    /// Whether a failing `get_or_set` producer also drops the key.
    pub invalidate_on_error: bool,
    /// Namespace for this instance.
    pub namespace: String,
    /// Whether statistics are tracked.
    pub enable_stats: bool,
    /// Whether the backend persists between runs (backend-interpreted).
    pub persistent: bool,
    /// Root directory override for file-based backends.
    pub cache_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: 3600,
            max_size: 1000,
            invalidate_on_error: false,
            namespace: "default".to_string(),
            enable_stats: true,
            persistent: false,
            cache_dir: None,
        }
    }
}

impl CacheConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.max_size < 1 {
            return Err(TaskForgeError::cache_config("max_size must be at least 1"));
        }
        if self.namespace.is_empty() {
            return Err(TaskForgeError::cache_config("namespace cannot be empty"));
        }
        Ok(())
    }
}

/// Result of a cache lookup.
///
/// `expired` distinguishes "found but past its TTL" from plain absence;
/// an expired lookup also removes the entry.
#[derive(Debug, Clone)]
pub struct CacheResult {
    /// The cached value on a hit
    pub value: Option<Value>,
    /// Whether the lookup found a live entry
    pub hit: bool,
    /// Origin timestamp of the entry (or lookup time on plain misses)
    pub timestamp: DateTime<Local>,
    /// Effective TTL of the entry in seconds
    pub ttl: u64,
    /// Whether the entry existed but had expired
    pub expired: bool,
    /// Additional lookup metadata (access counters, fill source)
    pub metadata: HashMap<String, Value>,
}

impl CacheResult {
    /// A plain miss.
    pub fn miss(ttl: u64) -> Self {
        Self {
            value: None,
            hit: false,
            timestamp: Local::now(),
            ttl,
            expired: false,
            metadata: HashMap::new(),
        }
    }

    /// A found-but-expired miss.
    pub fn expired(timestamp: DateTime<Local>, ttl: u64) -> Self {
        Self {
            value: None,
            hit: false,
            timestamp,
            ttl,
            expired: true,
            metadata: HashMap::new(),
        }
    }

    /// A hit carrying the cached value.
    pub fn hit(
        value: Value,
        timestamp: DateTime<Local>,
        ttl: u64,
        metadata: HashMap<String, Value>,
    ) -> Self {
        Self {
            value: Some(value),
            hit: true,
            timestamp,
            ttl,
            expired: false,
            metadata,
        }
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a live entry
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Stored entries
    pub sets: u64,
    /// Entries removed to hold the size cap
    pub evictions: u64,
    /// Backend errors
    pub errors: u64,
    /// `hits / (hits + misses)`
    pub hit_ratio: f64,
    /// Seconds since the instance was created
    pub uptime_seconds: f64,
    /// `(hits + misses) / uptime`
    pub operations_per_second: f64,
    /// Whether statistics tracking is enabled
    pub stats_enabled: bool,
}

/// Atomic statistics counters shared by the backends.
#[derive(Debug)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
    started: Instant,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, enabled: bool) -> CacheStats {
        if !enabled {
            return CacheStats {
                stats_enabled: false,
                ..CacheStats::default()
            };
        }
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let uptime = self.started.elapsed().as_secs_f64();
        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_ratio: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            uptime_seconds: uptime,
            operations_per_second: if uptime > 0.0 {
                total as f64 / uptime
            } else {
                0.0
            },
            stats_enabled: true,
        }
    }
}

/// Compile a `*`/`?` glob pattern used by `get_keys` into a regex.
pub(crate) fn compile_key_pattern(pattern: &str) -> Result<regex::Regex> {
    let mut source = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    regex::Regex::new(&source)
        .map_err(|e| TaskForgeError::cache_key(format!("invalid key pattern: {}", e)))
}

/// Interface implemented by every cache backend.
///
/// All operations take the instance's configured namespace; writes never
/// affect other namespaces, and `max_size` is a hard per-namespace cap
/// enforced at `set` time.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// This instance's configuration.
    fn config(&self) -> &CacheConfig;

    /// Statistics snapshot.
    fn stats(&self) -> CacheStats;

    /// Count an external error against this instance.
    fn record_error(&self);

    /// Look up a value. Expired entries report `hit = false,
    /// expired = true` and are removed in the same call.
    async fn get(&self, key: &CacheKey) -> Result<CacheResult>;

    /// Store a value. `ttl` overrides the configured TTL; null values are
    /// rejected.
    async fn set(&self, key: &CacheKey, value: Value, ttl: Option<u64>) -> Result<()>;

    /// Remove a key. Returns whether it existed.
    async fn invalidate(&self, key: &CacheKey) -> Result<bool>;

    /// Remove every entry in a namespace (default: the configured one).
    /// Returns the number of removed entries.
    async fn invalidate_namespace(&self, namespace: Option<&str>) -> Result<usize>;

    /// Remove every entry in every namespace. Returns the number removed.
    async fn clear(&self) -> Result<usize>;

    /// Keys in the configured namespace, optionally filtered by a
    /// `*`/`?` glob pattern.
    async fn get_keys(&self, pattern: Option<&str>) -> Result<Vec<String>>;

    /// Number of entries in the configured namespace.
    async fn get_size(&self) -> Result<usize>;

    /// Whether a live (non-expired) entry exists for the key.
    async fn has_key(&self, key: &CacheKey) -> Result<bool>;

    /// Eagerly remove expired entries in every namespace. Returns the
    /// number removed.
    async fn cleanup_expired(&self) -> Result<usize>;
}

/// Extension methods over any [`CacheBackend`].
#[async_trait]
pub trait CacheBackendExt: CacheBackend {
    /// Get a value, or produce, store, and return it on a miss or an
    /// expired hit.
    ///
    /// Producer failures are counted against the instance's error counter
    /// and, with `invalidate_on_error`, also drop the key.
    async fn get_or_set<F, Fut>(
        &self,
        key: &CacheKey,
        producer: F,
        ttl: Option<u64>,
    ) -> Result<CacheResult>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send;
}

#[async_trait]
impl<T: CacheBackend + ?Sized> CacheBackendExt for T {
    async fn get_or_set<F, Fut>(
        &self,
        key: &CacheKey,
        producer: F,
        ttl: Option<u64>,
    ) -> Result<CacheResult>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        let result = self.get(key).await?;
        if result.hit && !result.expired {
            return Ok(result);
        }
        match producer().await {
            Ok(value) => {
                self.set(key, value.clone(), ttl).await?;
                let mut metadata = HashMap::new();
                metadata.insert("source".to_string(), Value::String("producer".to_string()));
                Ok(CacheResult {
                    value: Some(value),
                    hit: false,
                    timestamp: Local::now(),
                    ttl: ttl.unwrap_or(self.config().ttl),
                    expired: false,
                    metadata,
                })
            }
            Err(error) => {
                self.record_error();
                if self.config().invalidate_on_error {
                    let _ = self.invalidate(key).await;
                }
                Err(error)
            }
        }
    }
}
