//! Bounded, thread-safe result cache keyed by query fingerprint.
//!
//! Maps a fingerprint string to the chunk ids of a prior retrieval. A
//! single mutex protects both the key map and the recency order; `get`
//! promotes the entry to most-recently-used, and inserting into a full
//! cache evicts the least-recently-used entry. Entries past the TTL are
//! treated as absent.

use crate::config::CacheConfig;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Cached outcome of one query: the chunk ids to rehydrate from the
/// backend, plus the insertion timestamp used for TTL checks.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub chunk_ids: Vec<i64>,
    pub cached_at: Instant,
}

/// LRU cache from query fingerprint to [`Retrieval`].
pub struct RetrievalCache {
    inner: Mutex<LruCache<String, Retrieval>>,
    ttl: Duration,
}

impl RetrievalCache {
    pub fn new(config: &CacheConfig) -> Self {
        // RagConfig::validate rejects a zero capacity; MIN only covers
        // direct construction with an unvalidated record.
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl: Duration::from_secs(config.ttl_seconds),
        }
    }

    /// Looks up a fingerprint, promoting the entry to most-recently-used.
    /// Expired entries are dropped and reported as misses.
    pub fn get(&self, key: &str) -> Option<Vec<i64>> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.peek(key) {
            if entry.cached_at.elapsed() >= self.ttl {
                inner.pop(key);
                return None;
            }
        }
        inner.get(key).map(|entry| entry.chunk_ids.clone())
    }

    /// Inserts or refreshes an entry; evicts the least-recently-used entry
    /// when the cache is at capacity.
    pub fn put(&self, key: impl Into<String>, chunk_ids: Vec<i64>) {
        self.inner.lock().put(
            key.into(),
            Retrieval {
                chunk_ids,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drops every entry (index rebuilds invalidate cached results).
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
