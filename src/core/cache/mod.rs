//! Multi-tier result caching.
//!
//! This module provides the cache engine used to memoize analysis results
//! between task runs:
//!
//! - [`CacheBackend`] — the abstract backend interface with TTL, LRU
//!   eviction, namespaces, and statistics
//! - [`MemoryCache`] — per-namespace in-memory LRU store
//! - [`FileCache`] — on-disk store persisting between runs, one hashed
//!   file per entry
//! - [`CacheManager`] — named instances (`short`/`medium`/`long` tiers per
//!   backend) with fan-out invalidation and statistics
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use taskforge::core::cache::{CacheBackend, CacheBackendExt, CacheKey, MemoryCache};
//! use serde_json::json;
//!
//! let cache = MemoryCache::with_defaults();
//! let key = CacheKey::from(vec!["audit".into(), "example.com".into()]);
//!
//! let result = cache
//!     .get_or_set(&key, || async { Ok(json!({"score": 87})) }, Some(600))
//!     .await?;
//! assert_eq!(result.value.unwrap()["score"], 87);
//! ```

pub mod backend;
pub mod file;
pub mod manager;
pub mod memory;

pub use backend::{
    CacheBackend, CacheBackendExt, CacheConfig, CacheKey, CacheResult, CacheStats,
};
pub use file::FileCache;
pub use manager::{CacheManager, cache_manager};
pub use memory::MemoryCache;
