use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cached value with an absolute expiry instant.
///
/// The value is wrapped in `Arc` so a cache hit is a reference-count bump,
/// not a copy of a potentially large serialized response.
#[derive(Debug)]
pub struct CacheEntry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Create an entry that expires `ttl` from now.
    ///
    /// A zero `ttl` produces an entry that is already expired.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self::with_deadline(Arc::new(value), deadline_after(ttl))
    }

    pub fn with_deadline(value: Arc<V>, expires_at: Instant) -> Self {
        Self { value, expires_at }
    }

    /// An entry is expired once its deadline is at or before `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn data(&self) -> &Arc<V> {
        &self.value
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

/// `now + ttl`, saturating at roughly a century for absurdly large TTLs.
pub(crate) fn deadline_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(Duration::from_secs(100 * 365 * 24 * 3600)))
        .unwrap_or(now)
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            expires_at: self.expires_at,
        }
    }
}
