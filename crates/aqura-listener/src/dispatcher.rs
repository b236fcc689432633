//! Maps change notifications to cache invalidations.
//!
//! | Channel | Action |
//! |---------|--------|
//! | `branches_changed` | invalidate `branches:all` |
//! | `erp_daily_sales_changed` | invalidate every `daily_sales:` key |
//! | `cache_invalidate` | invalidate the key named in the JSON payload, e.g. `{"key":"vendors:all"}` |
//!
//! Unknown channels and malformed payloads are logged and ignored. Applying
//! the same action twice is harmless, so redelivered notifications need no
//! deduplication.

use std::sync::Arc;

use aqura_cache::CacheInvalidator;
use aqura_cache::keys::{BRANCHES_ALL, DAILY_SALES_PREFIX};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::handler::NotificationHandler;
use crate::transport::Notification;

/// Fired by the `branches` table trigger.
pub const BRANCHES_CHANGED: &str = "branches_changed";

/// Fired by the `erp_daily_sales` table trigger.
pub const ERP_DAILY_SALES_CHANGED: &str = "erp_daily_sales_changed";

/// Generic channel carrying the key to evict in its payload.
pub const CACHE_INVALIDATE: &str = "cache_invalidate";

/// What to do when a notification arrives on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationRule {
    /// Invalidate one fixed key; the payload is ignored.
    Key(String),
    /// Invalidate every key with this prefix; the payload is ignored.
    Prefix(String),
    /// Invalidate the key named by the payload's `key` field.
    PayloadKey,
}

/// A single cache mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheAction {
    Invalidate(String),
    InvalidatePattern(String),
}

/// Parsed `cache_invalidate` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidatePayload {
    Recognized { key: String },
    Unrecognized,
}

#[derive(Debug, Deserialize)]
struct KeyPayload {
    key: String,
}

impl InvalidatePayload {
    /// Parse a JSON object with a string `key` field. Anything else,
    /// including an empty key, is `Unrecognized`.
    pub fn parse(payload: &str) -> Self {
        match serde_json::from_str::<KeyPayload>(payload) {
            Ok(parsed) if !parsed.key.is_empty() => Self::Recognized { key: parsed.key },
            Ok(_) => Self::Unrecognized,
            Err(e) => {
                debug!(error = %e, "Payload is not a cache key message");
                Self::Unrecognized
            }
        }
    }
}

/// Policy layer between the notification subscriber and the cache.
pub struct InvalidationDispatcher {
    cache: Arc<dyn CacheInvalidator>,
    rules: IndexMap<String, InvalidationRule>,
    clear_on_resync: bool,
}

impl InvalidationDispatcher {
    /// Dispatcher with no rules; every channel is unknown.
    #[must_use]
    pub fn new(cache: Arc<dyn CacheInvalidator>) -> Self {
        Self {
            cache,
            rules: IndexMap::new(),
            clear_on_resync: true,
        }
    }

    /// Dispatcher with the backend's standard channels.
    #[must_use]
    pub fn with_default_rules(cache: Arc<dyn CacheInvalidator>) -> Self {
        Self::new(cache)
            .with_rule(BRANCHES_CHANGED, InvalidationRule::Key(BRANCHES_ALL.to_string()))
            .with_rule(
                ERP_DAILY_SALES_CHANGED,
                InvalidationRule::Prefix(DAILY_SALES_PREFIX.to_string()),
            )
            .with_rule(CACHE_INVALIDATE, InvalidationRule::PayloadKey)
    }

    /// Add or replace the rule for `channel`.
    #[must_use]
    pub fn with_rule(mut self, channel: impl Into<String>, rule: InvalidationRule) -> Self {
        self.rules.insert(channel.into(), rule);
        self
    }

    /// Whether a resync (reconnect or dropped notifications) clears the cache.
    #[must_use]
    pub fn with_clear_on_resync(mut self, enabled: bool) -> Self {
        self.clear_on_resync = enabled;
        self
    }

    /// Channels with a rule, in registration order.
    pub fn channels(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    pub fn rule(&self, channel: &str) -> Option<&InvalidationRule> {
        self.rules.get(channel)
    }

    /// Decide what a notification should do to the cache. Performs no
    /// mutation.
    pub fn resolve(&self, channel: &str, payload: &str) -> Option<CacheAction> {
        let Some(rule) = self.rules.get(channel) else {
            warn!(channel = %channel, "Unknown notification channel");
            return None;
        };

        match rule {
            InvalidationRule::Key(key) => Some(CacheAction::Invalidate(key.clone())),
            InvalidationRule::Prefix(prefix) => {
                Some(CacheAction::InvalidatePattern(prefix.clone()))
            }
            InvalidationRule::PayloadKey => match InvalidatePayload::parse(payload) {
                InvalidatePayload::Recognized { key } => Some(CacheAction::Invalidate(key)),
                InvalidatePayload::Unrecognized => {
                    warn!(
                        channel = %channel,
                        payload = %payload,
                        "Ignoring malformed cache invalidation payload"
                    );
                    None
                }
            },
        }
    }

    /// Apply an action to the cache. Returns the number of removed entries.
    pub fn apply(&self, action: &CacheAction) -> usize {
        match action {
            CacheAction::Invalidate(key) => usize::from(self.cache.invalidate(key)),
            CacheAction::InvalidatePattern(prefix) => self.cache.invalidate_pattern(prefix),
        }
    }

    /// Resolve and apply one notification.
    pub fn dispatch(&self, channel: &str, payload: &str) -> Option<CacheAction> {
        let action = self.resolve(channel, payload)?;
        let removed = self.apply(&action);

        match &action {
            CacheAction::Invalidate(key) => {
                info!(channel = %channel, key = %key, removed, "Cache invalidated");
            }
            CacheAction::InvalidatePattern(prefix) => {
                info!(channel = %channel, prefix = %prefix, removed, "Cache invalidated by prefix");
            }
        }

        Some(action)
    }
}

impl NotificationHandler for InvalidationDispatcher {
    fn on_notification(&self, notification: &Notification) {
        self.dispatch(&notification.channel, &notification.payload);
    }

    fn on_resync(&self) {
        if self.clear_on_resync {
            self.cache.clear();
            warn!("Cache cleared after missed notifications");
        }
    }
}
