//! In-memory response cache for the Aqura backend.
//!
//! Entries carry an absolute deadline and are treated as absent once it has
//! passed. The cache never bounds its own size; memory is reclaimed by
//! invalidation, by [`ExpiringCache::clear`], or by the optional
//! [`spawn_sweeper`] task.
//!
//! ## Invalidation
//!
//! ```text
//! request handler ──set/get──▶ ExpiringCache ◀──invalidate── InvalidationDispatcher
//!                                                              ▲
//!                                               database NOTIFY│
//! ```
//!
//! Besides exact-key removal the cache supports removing a whole family of
//! keys by prefix, e.g. every `daily_sales:` variant regardless of the branch
//! and date range baked into the key.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use aqura_cache::ExpiringCache;
//!
//! let cache = ExpiringCache::new();
//! cache.set("sales:1", "a", Duration::from_secs(300));
//! cache.set("other:1", "c", Duration::from_secs(300));
//!
//! assert_eq!(cache.invalidate_pattern("sales:"), 1);
//! assert!(cache.get("sales:1").is_none());
//! assert_eq!(cache.get("other:1").as_deref(), Some(&"c"));
//! ```

mod entry;
mod store;
mod sweeper;

pub mod keys;

pub use entry::CacheEntry;
pub use store::{CacheStats, ExpiringCache};
pub use sweeper::spawn_sweeper;

/// Invalidation half of the cache, independent of the stored value type.
///
/// This is the seam between "what changed" and "what to evict": the
/// notification dispatcher only needs to remove entries, so it holds an
/// `Arc<dyn CacheInvalidator>` instead of a concrete cache type.
pub trait CacheInvalidator: Send + Sync {
    /// Remove a single entry. Returns `true` if an entry was present.
    fn invalidate(&self, key: &str) -> bool;

    /// Remove every entry whose key starts with `prefix` (byte-wise).
    ///
    /// Returns the number of removed entries.
    fn invalidate_pattern(&self, prefix: &str) -> usize;

    /// Remove every entry.
    fn clear(&self);
}
