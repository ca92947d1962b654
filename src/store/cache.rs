//! Bounded LRU of loaded maps.
//!
//! Keys cover every input that changes what a load returns: domain, map id
//! and requested scale. Saving a map invalidates all scales of its id.
//! Each entry also records the size and modification time of the file it
//! was read from, so writes by another process show up as misses.

use std::hash::Hasher;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::RwLock;
use xxhash_rust::xxh64::Xxh64;

use crate::types::{EnergyMap, EnergyMapMetadata};

/// Fallback capacity when `max_entries` is zero but the cache is enabled.
const FALLBACK_CAPACITY: usize = 128;

/// Configuration for the loaded-map cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: FALLBACK_CAPACITY,
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// A configuration with caching turned off.
    pub fn disabled() -> Self {
        Self {
            max_entries: 0,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey(u64);

impl CacheKey {
    fn compute(domain: &str, map_id: &str, scale: u32) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.write(domain.as_bytes());
        hasher.write(&[0]);
        hasher.write(map_id.as_bytes());
        hasher.write(&[0]);
        hasher.write(&scale.to_le_bytes());
        Self(hasher.finish())
    }
}

/// Size and modification time of a map file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// File length in bytes.
    pub len: u64,
    /// Modification time, when the platform reports one.
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    /// Stamp the file at `path`.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// A cached load result.
#[derive(Debug, Clone)]
pub struct CachedMap {
    /// Domain the map was loaded from.
    pub domain: String,
    /// Map id.
    pub map_id: String,
    /// The field.
    pub map: EnergyMap,
    /// Metadata computed at load.
    pub metadata: EnergyMapMetadata,
    /// Stamp of the file the map was read from.
    pub stamp: FileStamp,
}

/// Thread-safe LRU cache of loaded maps.
#[derive(Clone)]
pub struct MapCache {
    inner: Arc<RwLock<LruCache<CacheKey, CachedMap>>>,
}

impl MapCache {
    /// Build a cache, or `None` if the configuration disables it.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let cap = NonZeroUsize::new(config.max_entries)
            .or(NonZeroUsize::new(FALLBACK_CAPACITY))?;
        Some(Self {
            inner: Arc::new(RwLock::new(LruCache::new(cap))),
        })
    }

    /// Look up an entry and mark it recently used.
    ///
    /// An entry whose stamp differs from `stamp` is stale: every scale of
    /// its id is dropped and the lookup misses.
    pub fn get(&self, domain: &str, map_id: &str, scale: u32, stamp: &FileStamp) -> Option<CachedMap> {
        let key = CacheKey::compute(domain, map_id, scale);
        let hit = self.inner.write().get(&key).cloned();
        match hit {
            Some(entry) if entry.stamp != *stamp => {
                tracing::debug!(domain, map_id, scale, "Cached map is stale");
                self.invalidate(domain, map_id);
                None
            }
            hit => {
                tracing::debug!(domain, map_id, scale, hit = hit.is_some(), "Map cache lookup");
                hit
            }
        }
    }

    /// Insert or replace an entry.
    pub fn put(&self, scale: u32, entry: CachedMap) {
        let key = CacheKey::compute(&entry.domain, &entry.map_id, scale);
        self.inner.write().put(key, entry);
    }

    /// Drop every entry for `(domain, map_id)` regardless of scale.
    ///
    /// Returns the number removed.
    pub fn invalidate(&self, domain: &str, map_id: &str) -> usize {
        let mut cache = self.inner.write();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, v)| v.domain == domain && v.map_id == map_id)
            .map(|(k, _)| *k)
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        if !stale.is_empty() {
            tracing::debug!(domain, map_id, removed = stale.len(), "Map cache invalidated");
        }
        stale.len()
    }

    /// Current size and capacity.
    pub fn stats(&self) -> CacheStats {
        let cache = self.inner.read();
        CacheStats {
            len: cache.len(),
            cap: cache.cap().get(),
        }
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl std::fmt::Debug for MapCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("MapCache")
            .field("len", &stats.len)
            .field("cap", &stats.cap)
            .finish()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
}
