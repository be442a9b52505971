//! File-based cache backend for persistence between runs.
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use walkdir::WalkDir;

use super::backend::{
    CacheBackend, CacheConfig, CacheKey, CacheResult, CacheStats, StatsCounters,
    compile_key_pattern,
};
use crate::Result;
use crate::error::TaskForgeError;

/// On-disk entry record, one JSON file per key.
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    key: CacheKey,
    value: Value,
    ttl: u64,
    created_ts: f64,
    last_access_ts: f64,
    access_count: u64,
}

impl FileEntry {
    fn is_expired(&self, now_ts: f64) -> bool {
        self.ttl > 0 && now_ts - self.created_ts > self.ttl as f64
    }

    fn created_at(&self) -> DateTime<Local> {
        Local
            .timestamp_millis_opt((self.created_ts * 1000.0) as i64)
            .single()
            .unwrap_or_else(Local::now)
    }
}

fn now_ts() -> f64 {
    Local::now().timestamp_millis() as f64 / 1000.0
}

/// File-based cache implementation.
///
/// The cache root holds one subdirectory per namespace; each entry is one
/// file named `<hex(md5(key))>.cache` containing the serialized entry
/// record. An in-memory registry of filename stems is rebuilt from the
/// directory tree at startup, tolerating unrelated files. Eviction at the
/// `max_size` cap removes the oldest files by modification time; corrupt
/// files are deleted and treated as absent.
///
/// Because keys are hashed into filenames,
/// [`get_keys`](CacheBackend::get_keys) returns hash stems, not original
/// keys. Callers that need key enumeration should use the memory backend.
pub struct FileCache {
    config: CacheConfig,
    root: PathBuf,
    registry: Mutex<HashMap<String, HashSet<String>>>,
    stats: StatsCounters,
}

impl FileCache {
    /// Create a file cache rooted at `config.cache_dir` (or the platform
    /// cache directory), scanning existing namespace directories into the
    /// key registry.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let root = config.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("taskforge")
                .join("cache")
        });
        std::fs::create_dir_all(root.join(&config.namespace))
            .map_err(|e| TaskForgeError::cache_io(format!("error creating cache root: {}", e)))?;

        let registry = Self::scan_registry(&root)?;
        debug!(
            "File cache at {} with {} namespace(s)",
            root.display(),
            registry.len()
        );
        Ok(Self {
            config,
            root,
            registry: Mutex::new(registry),
            stats: StatsCounters::new(),
        })
    }

    /// Rebuild the stem registry from the directory tree, ignoring
    /// unrelated files.
    fn scan_registry(root: &Path) -> Result<HashMap<String, HashSet<String>>> {
        let mut registry: HashMap<String, HashSet<String>> = HashMap::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(2) {
            let entry = entry?;
            if entry.depth() == 1 && entry.file_type().is_dir() {
                registry
                    .entry(entry.file_name().to_string_lossy().to_string())
                    .or_default();
            } else if entry.depth() == 2 && entry.file_type().is_file() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("cache") {
                    continue;
                }
                let namespace = path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string());
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string());
                if let (Some(namespace), Some(stem)) = (namespace, stem) {
                    registry.entry(namespace).or_default().insert(stem);
                }
            }
        }
        Ok(registry)
    }

    fn key_stem(key: &CacheKey) -> String {
        format!("{:x}", md5::compute(key.to_string().as_bytes()))
    }

    fn entry_path(&self, namespace: &str, stem: &str) -> PathBuf {
        self.root.join(namespace).join(format!("{}.cache", stem))
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<FileEntry>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                self.stats.record_error();
                return Err(TaskForgeError::cache_io(format!(
                    "error reading cache file: {}",
                    e
                )));
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Corrupt entries are deleted and treated as absent.
                warn!("removing corrupt cache file {}: {}", path.display(), e);
                let _ = tokio::fs::remove_file(path).await;
                Ok(None)
            }
        }
    }

    async fn write_entry(&self, path: &Path, entry: &FileEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            self.stats.record_error();
            TaskForgeError::cache_io(format!("error writing cache file: {}", e))
        })
    }

    /// Remove the oldest files by mtime until the namespace is below the
    /// size cap. Returns the number of evicted entries.
    async fn evict_entries(
        &self,
        namespace: &str,
        stems: &mut HashSet<String>,
    ) -> Result<usize> {
        let dir = self.root.join(namespace);
        let mut files: Vec<(PathBuf, std::time::SystemTime, String)> = Vec::new();
        for stem in stems.iter() {
            let path = self.entry_path(namespace, stem);
            if let Ok(metadata) = tokio::fs::metadata(&path).await {
                let mtime = metadata
                    .modified()
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, mtime, stem.clone()));
            }
        }
        files.sort_by_key(|(_, mtime, _)| *mtime);

        let over = (files.len() + 1).saturating_sub(self.config.max_size);
        let to_remove = over.max(1).min(files.len());
        let mut evicted = 0;
        for (path, _, stem) in files.into_iter().take(to_remove) {
            if tokio::fs::remove_file(&path).await.is_ok() {
                stems.remove(&stem);
                self.stats.record_eviction();
                evicted += 1;
            }
        }
        debug!("evicted {} entries from {}", evicted, dir.display());
        Ok(evicted)
    }
}

#[async_trait]
impl CacheBackend for FileCache {
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
        let stem = Self::key_stem(key);
        let path = self.entry_path(&self.config.namespace, &stem);

        let mut registry = self.registry.lock().await;
        let Some(mut entry) = self.read_entry(&path).await? else {
            registry
                .entry(self.config.namespace.clone())
                .or_default()
                .remove(&stem);
            self.stats.record_miss();
            return Ok(CacheResult::miss(self.config.ttl));
        };

        let now = now_ts();
        if entry.is_expired(now) {
            let _ = tokio::fs::remove_file(&path).await;
            registry
                .entry(self.config.namespace.clone())
                .or_default()
                .remove(&stem);
            self.stats.record_miss();
            return Ok(CacheResult::expired(entry.created_at(), entry.ttl));
        }

        entry.last_access_ts = now;
        entry.access_count += 1;
        self.write_entry(&path, &entry).await?;

        let mut metadata = HashMap::new();
        metadata.insert("access_count".to_string(), Value::from(entry.access_count));
        metadata.insert(
            "last_accessed".to_string(),
            Value::from(entry.last_access_ts),
        );
        self.stats.record_hit();
        let created_at = entry.created_at();
        Ok(CacheResult::hit(entry.value, created_at, entry.ttl, metadata))
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
        let stem = Self::key_stem(key);
        let namespace = self.config.namespace.clone();
        tokio::fs::create_dir_all(self.root.join(&namespace))
            .await
            .map_err(|e| TaskForgeError::cache_io(format!("error creating namespace: {}", e)))?;

        let mut registry = self.registry.lock().await;
        let stems = registry.entry(namespace.clone()).or_default();
        if stems.len() >= self.config.max_size && !stems.contains(&stem) {
            self.evict_entries(&namespace, stems).await?;
        }

        let now = now_ts();
        let entry = FileEntry {
            key: key.clone(),
            value,
            ttl: ttl.unwrap_or(self.config.ttl),
            created_ts: now,
            last_access_ts: now,
            access_count: 0,
        };
        let path = self.entry_path(&namespace, &stem);
        self.write_entry(&path, &entry).await?;
        stems.insert(stem);
        self.stats.record_set();
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        key.validate()?;
        let stem = Self::key_stem(key);
        let path = self.entry_path(&self.config.namespace, &stem);
        let mut registry = self.registry.lock().await;
        registry
            .entry(self.config.namespace.clone())
            .or_default()
            .remove(&stem);
        Ok(tokio::fs::remove_file(&path).await.is_ok())
    }

    async fn invalidate_namespace(&self, namespace: Option<&str>) -> Result<usize> {
        let target = namespace.unwrap_or(&self.config.namespace).to_string();
        let mut registry = self.registry.lock().await;
        let Some(stems) = registry.get_mut(&target) else {
            return Ok(0);
        };
        let mut removed = 0;
        for stem in stems.drain() {
            let path = self.root.join(&target).join(format!("{}.cache", stem));
            if tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize> {
        let mut registry = self.registry.lock().await;
        let count = registry.values().map(|stems| stems.len()).sum();
        tokio::fs::remove_dir_all(&self.root)
            .await
            .map_err(|e| TaskForgeError::cache_io(format!("error clearing cache: {}", e)))?;
        tokio::fs::create_dir_all(self.root.join(&self.config.namespace))
            .await
            .map_err(|e| TaskForgeError::cache_io(format!("error recreating cache: {}", e)))?;
        registry.clear();
        registry.insert(self.config.namespace.clone(), HashSet::new());
        Ok(count)
    }

    async fn get_keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let registry = self.registry.lock().await;
        let stems = registry
            .get(&self.config.namespace)
            .map(|stems| stems.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        match pattern {
            Some(pattern) => {
                let matcher = compile_key_pattern(pattern)?;
                Ok(stems
                    .into_iter()
                    .filter(|stem| matcher.is_match(stem))
                    .collect())
            }
            None => Ok(stems),
        }
    }

    async fn get_size(&self) -> Result<usize> {
        let registry = self.registry.lock().await;
        Ok(registry
            .get(&self.config.namespace)
            .map(|stems| stems.len())
            .unwrap_or(0))
    }

    async fn has_key(&self, key: &CacheKey) -> Result<bool> {
        if key.validate().is_err() {
            return Ok(false);
        }
        let stem = Self::key_stem(key);
        let path = self.entry_path(&self.config.namespace, &stem);
        let mut registry = self.registry.lock().await;
        let Some(entry) = self.read_entry(&path).await? else {
            return Ok(false);
        };
        if entry.is_expired(now_ts()) {
            let _ = tokio::fs::remove_file(&path).await;
            registry
                .entry(self.config.namespace.clone())
                .or_default()
                .remove(&stem);
            return Ok(false);
        }
        Ok(true)
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut registry = self.registry.lock().await;
        let now = now_ts();
        let mut removed = 0;
        for (namespace, stems) in registry.iter_mut() {
            let mut dead = Vec::new();
            for stem in stems.iter() {
                let path = self.root.join(namespace).join(format!("{}.cache", stem));
                match self.read_entry(&path).await? {
                    Some(entry) if entry.is_expired(now) => {
                        let _ = tokio::fs::remove_file(&path).await;
                        dead.push(stem.clone());
                    }
                    Some(_) => {}
                    None => dead.push(stem.clone()),
                }
            }
            for stem in dead {
                stems.remove(&stem);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir, max_size: usize, ttl: u64) -> FileCache {
        FileCache::new(CacheConfig {
            max_size,
            ttl,
            persistent: true,
            cache_dir: Some(dir.path().to_path_buf()),
            ..CacheConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 10, 3600);
        let key = CacheKey::from("page");
        cache.set(&key, json!({"score": 91}), None).await.unwrap();
        let result = cache.get(&key).await.unwrap();
        assert!(result.hit);
        assert_eq!(result.value.unwrap(), json!({"score": 91}));
    }

    #[tokio::test]
    async fn test_on_disk_layout() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 10, 3600);
        let key = CacheKey::from("layout");
        cache.set(&key, json!(1), None).await.unwrap();
        let expected = dir
            .path()
            .join("default")
            .join(format!("{:x}.cache", md5::compute(b"layout")));
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_registry_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let cache = cache_in(&dir, 10, 3600);
            cache
                .set(&CacheKey::from("persisted"), json!(7), None)
                .await
                .unwrap();
        }
        // Unrelated files in the root are ignored by the scan.
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();
        let cache = cache_in(&dir, 10, 3600);
        assert_eq!(cache.get_size().await.unwrap(), 1);
        let result = cache.get(&CacheKey::from("persisted")).await.unwrap();
        assert!(result.hit);
        assert_eq!(result.value.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn test_expired_entry_removed_and_flagged() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 10, 3600);
        let key = CacheKey::from("fleeting");
        cache.set(&key, json!(1), Some(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let result = cache.get(&key).await.unwrap();
        assert!(!result.hit);
        assert!(result.expired);
        assert!(!cache.has_key(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 10, 3600);
        let key = CacheKey::from("broken");
        cache.set(&key, json!(1), None).await.unwrap();
        let path = dir
            .path()
            .join("default")
            .join(format!("{:x}.cache", md5::compute(b"broken")));
        std::fs::write(&path, b"not json").unwrap();
        let result = cache.get(&key).await.unwrap();
        assert!(!result.hit);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_eviction_by_mtime() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 2, 3600);
        cache.set(&CacheKey::from("a"), json!(1), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        cache.set(&CacheKey::from("b"), json!(2), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        cache.set(&CacheKey::from("c"), json!(3), None).await.unwrap();
        assert!(cache.get_size().await.unwrap() <= 2);
        // The oldest file was removed.
        assert!(!cache.has_key(&CacheKey::from("a")).await.unwrap());
        assert!(cache.has_key(&CacheKey::from("c")).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_recreates_root() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 10, 3600);
        cache.set(&CacheKey::from("a"), json!(1), None).await.unwrap();
        cache.set(&CacheKey::from("b"), json!(2), None).await.unwrap();
        let cleared = cache.clear().await.unwrap();
        assert_eq!(cleared, 2);
        assert_eq!(cache.get_size().await.unwrap(), 0);
        assert!(dir.path().join("default").exists());
    }

    #[tokio::test]
    async fn test_get_keys_returns_hash_stems() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 10, 3600);
        cache
            .set(&CacheKey::from("original-key"), json!(1), None)
            .await
            .unwrap();
        let keys = cache.get_keys(None).await.unwrap();
        assert_eq!(keys, vec![format!("{:x}", md5::compute(b"original-key"))]);
    }

    #[tokio::test]
    async fn test_compound_key_hashing() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 10, 3600);
        let key = CacheKey::from(vec!["audit".to_string(), "example.com".to_string()]);
        cache.set(&key, json!("ok"), None).await.unwrap();
        let result = cache.get(&key).await.unwrap();
        assert!(result.hit);
        let expected = dir
            .path()
            .join("default")
            .join(format!("{:x}.cache", md5::compute(b"audit_example.com")));
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 10, 3600);
        cache
            .set(&CacheKey::from("short"), json!(1), Some(1))
            .await
            .unwrap();
        cache.set(&CacheKey::from("long"), json!(2), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let removed = cache.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.get_size().await.unwrap(), 1);
    }
}
