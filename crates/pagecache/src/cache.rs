//! FileCache: shared LRU over file contents

use bytes::Bytes;
use parking_lot::Mutex;

use crate::lru::LruCache;
use crate::stats::CacheStats;

/// Thread-safe LRU cache keyed by absolute file path
///
/// Every operation takes the same exclusive lock, so the map, the recency
/// list and the counters always change together.
pub struct FileCache {
    inner: Mutex<Inner>,
}

struct Inner {
    lru: LruCache<String, Bytes>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl FileCache {
    /// Create a cache holding at most `max_bytes` of file contents
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(max_bytes),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Look up file contents
    ///
    /// A hit promotes the entry to most recently used. The returned `Bytes`
    /// shares the cached buffer.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let value = inner.lru.get(key).cloned();
        match value {
            Some(value) => {
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace file contents, evicting least recently used entries
    /// as needed
    pub fn put(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        let mut inner = self.inner.lock();
        let evicted = inner.lru.put(key.into(), value.into());
        inner.evictions += evicted as u64;
    }

    /// Check whether a key is cached without counting a lookup
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    /// Hits divided by total lookups, or 0.0 before any lookup
    pub fn hit_rate(&self) -> f64 {
        self.stats().hit_ratio()
    }

    /// Sum of cached value sizes
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().lru.size_bytes()
    }

    /// Configured byte budget
    pub fn capacity_bytes(&self) -> usize {
        self.inner.lock().lru.max_bytes()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Consistent snapshot of counters and occupancy
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            entries: inner.lru.len(),
            size_bytes: inner.lru.size_bytes(),
            capacity_bytes: inner.lru.max_bytes(),
        }
    }
}
