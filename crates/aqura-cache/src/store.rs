//! The process-wide expiring key/value store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::CacheInvalidator;
use crate::entry::{CacheEntry, deadline_after};

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of entries currently stored, including expired ones not yet swept.
    pub size: usize,
    /// Number of reads that returned a live entry.
    pub hits: u64,
    /// Number of reads that found nothing or only an expired entry.
    pub misses: u64,
    /// Number of expired entries removed by [`ExpiringCache::cleanup_expired`].
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Time-expiring key/value cache.
///
/// Keys are opaque strings, conventionally colon-delimited namespaces such as
/// `daily_sales:branch:3:range:2024-01-01:2024-01-31`. Values are opaque to
/// the cache: they are never inspected, compared or serialized.
///
/// ## Concurrency
///
/// Backed by a sharded `DashMap`: reads take a shared lock on one shard and
/// never wait on other reads, writes take an exclusive lock on one shard.
/// Prefix invalidation and `clear` visit every shard in turn. No operation
/// suspends, so the cache can be called from async code and from the
/// notification worker alike.
///
/// One instance is meant to live for the whole process and be shared as
/// `Arc<ExpiringCache<V>>`.
pub struct ExpiringCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> ExpiringCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a live value by key.
    ///
    /// Returns `None` if no entry exists or its deadline has passed. Expired
    /// entries are filtered, not removed, so a miss never takes a write lock.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();

        let found = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| Arc::clone(entry.data()));

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        found
    }

    /// Insert or replace the entry for `key`, expiring `ttl` from now.
    ///
    /// Last writer wins. A zero `ttl` stores an entry that is immediately
    /// treated as absent.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_arc(key, Arc::new(value), ttl);
    }

    /// Like [`set`](Self::set) for a value that is already shared.
    pub fn set_arc(&self, key: impl Into<String>, value: Arc<V>, ttl: Duration) {
        let key = key.into();
        debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
        self.entries
            .insert(key, CacheEntry::with_deadline(value, deadline_after(ttl)));
    }

    /// Remove the entry for `key`. Returns `true` if one was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        debug!(key = %key, removed, "cache invalidated");
        removed
    }

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// Plain byte-wise prefix match; no glob or regex semantics. An empty
    /// prefix matches every key.
    pub fn invalidate_pattern(&self, prefix: &str) -> usize {
        let mut removed = 0;

        self.entries.retain(|key, _| {
            if key.starts_with(prefix) {
                removed += 1;
                false
            } else {
                true
            }
        });

        debug!(prefix = %prefix, removed, "cache invalidated by prefix");
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.clear();
        debug!("cache cleared");
    }

    /// Remove expired entries to free memory.
    ///
    /// Does not change what [`get`](Self::get) observes. Returns the number of
    /// entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.is_expired_at(now) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }

        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync> CacheInvalidator for ExpiringCache<V> {
    fn invalidate(&self, key: &str) -> bool {
        ExpiringCache::invalidate(self, key)
    }

    fn invalidate_pattern(&self, prefix: &str) -> usize {
        ExpiringCache::invalidate_pattern(self, prefix)
    }

    fn clear(&self) {
        ExpiringCache::clear(self)
    }
}
