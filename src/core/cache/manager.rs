//! Cache manager coordinating backend instances across the application.
use log::info;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::backend::{CacheBackend, CacheBackendExt, CacheConfig, CacheKey, CacheResult, CacheStats};
use super::file::FileCache;
use super::memory::MemoryCache;
use crate::Result;
use crate::config::CacheSettings;
use crate::error::TaskForgeError;

/// Named cache tiers created by the manager.
const TIERS: [(&str, u64, &str); 3] = [
    ("short", 300, "short_term"),
    ("medium", 3600, "medium_term"),
    ("long", 86400, "long_term"),
];

const MEMORY_TIER_SIZES: [usize; 3] = [1_000, 5_000, 10_000];
// File tiers scale the memory tiers by the 10:1 ratio of the backend
// defaults (memory 10k, file 100k).
const FILE_TIER_SIZES: [usize; 3] = [10_000, 50_000, 100_000];

/// Manages caching operations across the application.
///
/// On first use the manager registers the two backends and creates a
/// default instance plus `{memory,file} x {short,medium,long}` tiers with
/// distinct namespaces and size caps. Instances are looked up by
/// `(type, name)`; invalidation, statistics, and cleanup can fan out
/// across every instance.
///
/// A process-wide instance is available through [`cache_manager`].
pub struct CacheManager {
    instances: Mutex<HashMap<String, Arc<dyn CacheBackend>>>,
}

impl CacheManager {
    /// Create an empty, uninitialized manager.
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Initialize the cache system, creating the default and tiered
    /// instances. Safe to call more than once; later calls are no-ops.
    pub async fn initialize(&self, settings: Option<&CacheSettings>) -> Result<()> {
        let mut instances = self.instances.lock().await;
        if !instances.is_empty() {
            return Ok(());
        }

        let cache_dir = settings.map(|s| s.effective_cache_dir());
        let enable_stats = settings.map(|s| s.enable_stats).unwrap_or(true);
        let invalidate_on_error = settings.map(|s| s.invalidate_on_error).unwrap_or(false);

        let base = CacheConfig {
            enable_stats,
            invalidate_on_error,
            cache_dir: cache_dir.clone(),
            ..CacheConfig::default()
        };

        let memory_default = CacheConfig {
            ttl: 3600,
            max_size: 10_000,
            ..base.clone()
        };
        instances.insert(
            "memory".to_string(),
            Arc::new(MemoryCache::new(memory_default)?) as Arc<dyn CacheBackend>,
        );

        let file_default = CacheConfig {
            ttl: 86_400,
            max_size: 100_000,
            persistent: true,
            ..base.clone()
        };
        instances.insert(
            "file".to_string(),
            Arc::new(FileCache::new(file_default)?) as Arc<dyn CacheBackend>,
        );

        for (index, (name, ttl, namespace)) in TIERS.iter().enumerate() {
            let memory_config = CacheConfig {
                ttl: *ttl,
                max_size: MEMORY_TIER_SIZES[index],
                namespace: namespace.to_string(),
                ..base.clone()
            };
            instances.insert(
                format!("memory_{}", name),
                Arc::new(MemoryCache::new(memory_config)?) as Arc<dyn CacheBackend>,
            );

            let file_config = CacheConfig {
                ttl: *ttl,
                max_size: FILE_TIER_SIZES[index],
                namespace: namespace.to_string(),
                persistent: true,
                ..base.clone()
            };
            instances.insert(
                format!("file_{}", name),
                Arc::new(FileCache::new(file_config)?) as Arc<dyn CacheBackend>,
            );
        }

        info!("Cache manager initialized with {} instances", instances.len());
        Ok(())
    }

    /// Get a cache instance by type (`memory` or `file`) and optional tier
    /// name (`short`, `medium`, `long`).
    pub async fn get_cache(
        &self,
        cache_type: &str,
        name: Option<&str>,
    ) -> Result<Arc<dyn CacheBackend>> {
        self.initialize(None).await?;
        if !matches!(cache_type, "memory" | "file") {
            return Err(TaskForgeError::cache_config(format!(
                "invalid cache type: {}",
                cache_type
            )));
        }
        let instance_key = match name {
            None => cache_type.to_string(),
            Some(name) => {
                if !matches!(name, "short" | "medium" | "long") {
                    return Err(TaskForgeError::cache_config(format!(
                        "invalid cache name: {}",
                        name
                    )));
                }
                format!("{}_{}", cache_type, name)
            }
        };
        let instances = self.instances.lock().await;
        instances
            .get(&instance_key)
            .cloned()
            .ok_or_else(|| {
                TaskForgeError::cache_config(format!("cache not found: {}", instance_key))
            })
    }

    /// Get a value from the selected cache instance.
    pub async fn get(
        &self,
        key: &CacheKey,
        cache_type: &str,
        name: Option<&str>,
    ) -> Result<CacheResult> {
        let cache = self.get_cache(cache_type, name).await?;
        cache.get(key).await
    }

    /// Set a value in the selected cache instance.
    pub async fn set(
        &self,
        key: &CacheKey,
        value: Value,
        ttl: Option<u64>,
        cache_type: &str,
        name: Option<&str>,
    ) -> Result<()> {
        let cache = self.get_cache(cache_type, name).await?;
        cache.set(key, value, ttl).await
    }

    /// Invalidate a key, optionally fanning out across instances.
    ///
    /// With a `cache_type` the key is removed from that instance only;
    /// without one it is removed from every registered instance.
    pub async fn invalidate(
        &self,
        key: &CacheKey,
        cache_type: Option<&str>,
        name: Option<&str>,
    ) -> Result<()> {
        match cache_type {
            Some(cache_type) => {
                let cache = self.get_cache(cache_type, name).await?;
                cache.invalidate(key).await?;
            }
            None => {
                self.initialize(None).await?;
                let instances: Vec<Arc<dyn CacheBackend>> =
                    self.instances.lock().await.values().cloned().collect();
                for cache in instances {
                    let _ = cache.invalidate(key).await;
                }
            }
        }
        Ok(())
    }

    /// Clear every instance. Returns per-instance cleared counts.
    pub async fn clear_all(&self) -> Result<HashMap<String, usize>> {
        self.initialize(None).await?;
        let instances: Vec<(String, Arc<dyn CacheBackend>)> = self
            .instances
            .lock()
            .await
            .iter()
            .map(|(name, cache)| (name.clone(), Arc::clone(cache)))
            .collect();
        let mut cleared = HashMap::new();
        for (name, cache) in instances {
            cleared.insert(name, cache.clear().await?);
        }
        Ok(cleared)
    }

    /// Statistics for every instance.
    pub async fn stats(&self) -> Result<HashMap<String, CacheStats>> {
        self.initialize(None).await?;
        let instances = self.instances.lock().await;
        Ok(instances
            .iter()
            .map(|(name, cache)| (name.clone(), cache.stats()))
            .collect())
    }

    /// Remove expired entries in every instance. Returns per-instance
    /// removal counts.
    pub async fn cleanup(&self) -> Result<HashMap<String, usize>> {
        self.initialize(None).await?;
        let instances: Vec<(String, Arc<dyn CacheBackend>)> = self
            .instances
            .lock()
            .await
            .iter()
            .map(|(name, cache)| (name.clone(), Arc::clone(cache)))
            .collect();
        let mut removed = HashMap::new();
        for (name, cache) in instances {
            removed.insert(name, cache.cleanup_expired().await?);
        }
        Ok(removed)
    }

    /// Get a value from cache or compute and store it.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
        ttl: Option<u64>,
        cache_type: &str,
        name: Option<&str>,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        let cache = self.get_cache(cache_type, name).await?;
        let result = cache.get_or_set(key, compute, ttl).await?;
        result
            .value
            .ok_or_else(|| TaskForgeError::cache_value("producer returned no value"))
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

static CACHE_MANAGER: Lazy<CacheManager> = Lazy::new(CacheManager::new);

/// Process-wide cache manager instance.
pub fn cache_manager() -> &'static CacheManager {
    &CACHE_MANAGER
}
