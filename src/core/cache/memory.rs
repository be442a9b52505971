//! In-memory cache backend with per-namespace LRU eviction.
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::backend::{
    CacheBackend, CacheConfig, CacheKey, CacheResult, CacheStats, StatsCounters,
    compile_key_pattern,
};
use crate::Result;
use crate::error::TaskForgeError;

struct MemoryEntry {
    value: Value,
    ttl: u64,
    created_at: DateTime<Local>,
    last_accessed: DateTime<Local>,
    access_count: u64,
    recency: u64,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.ttl > 0 && Local::now() - self.created_at > chrono::Duration::seconds(self.ttl as i64)
    }

    fn access(&mut self) {
        self.last_accessed = Local::now();
        self.access_count += 1;
    }
}

/// One namespace: an entry map plus a lazy-deletion recency queue.
///
/// Each touch appends a `(key, stamp)` pair and stores the stamp on the
/// entry; eviction pops from the front and skips pairs whose stamp no
/// longer matches, giving amortized O(1) LRU without an ordered map.
#[derive(Default)]
struct Namespace {
    entries: HashMap<CacheKey, MemoryEntry>,
    recency: VecDeque<(CacheKey, u64)>,
    next_stamp: u64,
}

impl Namespace {
    fn touch(&mut self, key: &CacheKey) {
        self.next_stamp += 1;
        let stamp = self.next_stamp;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.recency = stamp;
        }
        self.recency.push_back((key.clone(), stamp));
    }

    fn evict_lru(&mut self) -> bool {
        while let Some((key, stamp)) = self.recency.pop_front() {
            let live = matches!(self.entries.get(&key), Some(entry) if entry.recency == stamp);
            if live {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }
}

/// In-memory cache implementation.
///
/// Entries are stored per namespace with least-recently-used eviction at
/// the `max_size` cap. Expired entries are removed lazily on lookup and
/// eagerly by [`cleanup_expired`](CacheBackend::cleanup_expired). A single
/// per-instance lock guards reads and writes; the expected workload is
/// coarse-grained caching of analysis outputs, so contention is
/// acceptable.
pub struct MemoryCache {
    config: CacheConfig,
    namespaces: Mutex<HashMap<String, Namespace>>,
    stats: StatsCounters,
}

impl MemoryCache {
    /// Create a memory cache, validating the configuration.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let mut namespaces = HashMap::new();
        namespaces.insert(config.namespace.clone(), Namespace::default());
        Ok(Self {
            config,
            namespaces: Mutex::new(namespaces),
            stats: StatsCounters::new(),
        })
    }

    /// Create a memory cache with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default()).expect("default cache config is valid")
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.config.enable_stats)
    }

    fn record_error(&self) {
        self.stats.record_error();
    }

    async fn get(&self, key: &CacheKey) -> Result<CacheResult> {
        if key.validate().is_err() {
            self.stats.record_miss();
            return Err(TaskForgeError::cache_key("cache key cannot be empty"));
        }
        let mut namespaces = self.namespaces.lock().await;
        let namespace = namespaces.entry(self.config.namespace.clone()).or_default();

        let Some(entry) = namespace.entries.get_mut(key) else {
            self.stats.record_miss();
            return Ok(CacheResult::miss(self.config.ttl));
        };

        if entry.is_expired() {
            let timestamp = entry.created_at;
            let ttl = entry.ttl;
            namespace.entries.remove(key);
            self.stats.record_miss();
            return Ok(CacheResult::expired(timestamp, ttl));
        }

        entry.access();
        let mut metadata = HashMap::new();
        metadata.insert("access_count".to_string(), Value::from(entry.access_count));
        metadata.insert(
            "last_accessed".to_string(),
            Value::String(entry.last_accessed.to_rfc3339()),
        );
        let result = CacheResult::hit(
            entry.value.clone(),
            entry.created_at,
            entry.ttl,
            metadata,
        );
        namespace.touch(key);
        self.stats.record_hit();
        Ok(result)
    }

    async fn set(&self, key: &CacheKey, value: Value, ttl: Option<u64>) -> Result<()> {
        if key.validate().is_err() {
            self.stats.record_error();
            return Err(TaskForgeError::cache_key("cache key cannot be empty"));
        }
        if value.is_null() {
            self.stats.record_error();
            return Err(TaskForgeError::cache_value("cache value cannot be null"));
        }
        let ttl = ttl.unwrap_or(self.config.ttl);
        let mut namespaces = self.namespaces.lock().await;
        let namespace = namespaces.entry(self.config.namespace.clone()).or_default();

        if namespace.entries.len() >= self.config.max_size && !namespace.entries.contains_key(key)
        {
            if namespace.evict_lru() {
                self.stats.record_eviction();
            }
        }

        let now = Local::now();
        namespace.entries.insert(
            key.clone(),
            MemoryEntry {
                value,
                ttl,
                created_at: now,
                last_accessed: now,
                access_count: 0,
                recency: 0,
            },
        );
        namespace.touch(key);
        self.stats.record_set();
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        key.validate()?;
        let mut namespaces = self.namespaces.lock().await;
        let namespace = namespaces.entry(self.config.namespace.clone()).or_default();
        Ok(namespace.entries.remove(key).is_some())
    }

    async fn invalidate_namespace(&self, namespace: Option<&str>) -> Result<usize> {
        let target = namespace.unwrap_or(&self.config.namespace);
        let mut namespaces = self.namespaces.lock().await;
        match namespaces.get_mut(target) {
            Some(namespace) => {
                let count = namespace.entries.len();
                namespace.entries.clear();
                namespace.recency.clear();
                Ok(count)
            }
            None => Ok(0),
        }
    }

    async fn clear(&self) -> Result<usize> {
        let mut namespaces = self.namespaces.lock().await;
        let count = namespaces
            .values()
            .map(|namespace| namespace.entries.len())
            .sum();
        namespaces.clear();
        namespaces.insert(self.config.namespace.clone(), Namespace::default());
        Ok(count)
    }

    async fn get_keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let namespaces = self.namespaces.lock().await;
        let Some(namespace) = namespaces.get(&self.config.namespace) else {
            return Ok(Vec::new());
        };
        let keys = namespace.entries.keys().map(|key| key.to_string());
        match pattern {
            Some(pattern) => {
                let matcher = compile_key_pattern(pattern)?;
                Ok(keys.filter(|key| matcher.is_match(key)).collect())
            }
            None => Ok(keys.collect()),
        }
    }

    async fn get_size(&self) -> Result<usize> {
        let namespaces = self.namespaces.lock().await;
        Ok(namespaces
            .get(&self.config.namespace)
            .map(|namespace| namespace.entries.len())
            .unwrap_or(0))
    }

    async fn has_key(&self, key: &CacheKey) -> Result<bool> {
        if key.validate().is_err() {
            return Ok(false);
        }
        let mut namespaces = self.namespaces.lock().await;
        let namespace = namespaces.entry(self.config.namespace.clone()).or_default();
        match namespace.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                namespace.entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut namespaces = self.namespaces.lock().await;
        let mut removed = 0;
        for namespace in namespaces.values_mut() {
            let before = namespace.entries.len();
            namespace.entries.retain(|_, entry| !entry.is_expired());
            removed += before - namespace.entries.len();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(max_size: usize, ttl: u64) -> MemoryCache {
        MemoryCache::new(CacheConfig {
            max_size,
            ttl,
            ..CacheConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let cache = cache(10, 3600);
        let key = CacheKey::from("k");
        cache.set(&key, json!("v"), None).await.unwrap();
        let result = cache.get(&key).await.unwrap();
        assert!(result.hit);
        assert_eq!(result.value.unwrap(), json!("v"));
        assert!(!result.expired);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = cache(10, 3600);
        let result = cache.get(&CacheKey::from("absent")).await.unwrap();
        assert!(!result.hit);
        assert!(!result.expired);
        assert!(result.value.is_none());
    }

    #[tokio::test]
    async fn test_null_value_rejected() {
        let cache = cache(10, 3600);
        let err = cache
            .set(&CacheKey::from("k"), Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskForgeError::CacheValue { .. }));
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let cache = cache(10, 3600);
        assert!(cache.get(&CacheKey::from("")).await.is_err());
        assert!(
            cache
                .set(&CacheKey::from(""), json!(1), None)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed_on_get() {
        let cache = cache(10, 3600);
        let key = CacheKey::from("fleeting");
        cache.set(&key, json!(1), Some(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let result = cache.get(&key).await.unwrap();
        assert!(!result.hit);
        assert!(result.expired);
        assert_eq!(cache.get_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let cache = cache(10, 0);
        let key = CacheKey::from("forever");
        cache.set(&key, json!(1), Some(0)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let result = cache.get(&key).await.unwrap();
        assert!(result.hit);
    }

    #[tokio::test]
    async fn test_lru_eviction_prefers_least_recent() {
        let cache = cache(3, 3600);
        for key in ["k1", "k2", "k3"] {
            cache.set(&CacheKey::from(key), json!(key), None).await.unwrap();
        }
        // Touch k1 so k2 becomes the least recently used.
        cache.get(&CacheKey::from("k1")).await.unwrap();
        cache.set(&CacheKey::from("k4"), json!("k4"), None).await.unwrap();

        assert!(cache.has_key(&CacheKey::from("k1")).await.unwrap());
        assert!(!cache.has_key(&CacheKey::from("k2")).await.unwrap());
        assert!(cache.has_key(&CacheKey::from("k3")).await.unwrap());
        assert!(cache.has_key(&CacheKey::from("k4")).await.unwrap());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_max_size_one_evicts_every_time() {
        let cache = cache(1, 3600);
        for i in 0..4 {
            cache
                .set(&CacheKey::from(format!("k{}", i)), json!(i), None)
                .await
                .unwrap();
            assert_eq!(cache.get_size().await.unwrap(), 1);
        }
        assert_eq!(cache.stats().evictions, 3);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = cache(2, 3600);
        cache.set(&CacheKey::from("a"), json!(1), None).await.unwrap();
        cache.set(&CacheKey::from("b"), json!(2), None).await.unwrap();
        cache.set(&CacheKey::from("a"), json!(3), None).await.unwrap();
        assert_eq!(cache.get_size().await.unwrap(), 2);
        assert_eq!(cache.stats().evictions, 0);
        let result = cache.get(&CacheKey::from("a")).await.unwrap();
        assert_eq!(result.value.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = cache(10, 3600);
        let key = CacheKey::from("k");
        cache.set(&key, json!(1), None).await.unwrap();
        assert!(cache.invalidate(&key).await.unwrap());
        assert!(!cache.invalidate(&key).await.unwrap());
        let result = cache.get(&key).await.unwrap();
        assert!(!result.hit);
    }

    #[tokio::test]
    async fn test_get_keys_with_pattern() {
        let cache = cache(10, 3600);
        for key in ["audit_a", "audit_b", "report_c"] {
            cache.set(&CacheKey::from(key), json!(1), None).await.unwrap();
        }
        let mut keys = cache.get_keys(Some("audit*")).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["audit_a", "audit_b"]);
        assert_eq!(cache.get_keys(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let cache = cache(10, 3600);
        cache
            .set(&CacheKey::from("short"), json!(1), Some(1))
            .await
            .unwrap();
        cache
            .set(&CacheKey::from("long"), json!(2), None)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let removed = cache.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.get_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stats_accuracy() {
        let cache = cache(10, 3600);
        let key = CacheKey::from("k");
        cache.set(&key, json!(1), None).await.unwrap();
        cache.get(&key).await.unwrap();
        cache.get(&CacheKey::from("missing")).await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert!((stats.hit_ratio - 0.5).abs() < f64::EPSILON);
    }
}
