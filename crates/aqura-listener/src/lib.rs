//! Database change notifications for cache coherence.
//!
//! PostgreSQL triggers `NOTIFY` on a handful of channels whenever cached
//! tables change. This crate keeps a permanent LISTEN connection open and
//! turns each notification into a cache invalidation.
//!
//! - [`NotificationSubscriber`]: owns the connection, reconnects with
//!   backoff, pings idle connections and hands notifications to a worker.
//! - [`InvalidationDispatcher`]: the policy that maps a channel (and
//!   sometimes its payload) to an exact-key or prefix invalidation.
//! - [`PgNotificationConnector`]: the `PgListener`-backed transport.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use aqura_cache::ExpiringCache;
//! use aqura_listener::{
//!     InvalidationDispatcher, NotificationSubscriber, PgNotificationConnector, SubscriberConfig,
//! };
//!
//! let cache = Arc::new(ExpiringCache::<Vec<u8>>::new());
//! let dispatcher = InvalidationDispatcher::with_default_rules(cache.clone());
//! let config = SubscriberConfig::new(dispatcher.channels());
//!
//! let handle = NotificationSubscriber::new(PgNotificationConnector::new(pool), config)
//!     .start(dispatcher)
//!     .await?;
//! ```

mod backoff;
mod error;
mod handler;
mod postgres;
mod subscriber;
mod transport;

pub mod dispatcher;

pub use backoff::ReconnectPolicy;
pub use dispatcher::{CacheAction, InvalidatePayload, InvalidationDispatcher, InvalidationRule};
pub use error::{ListenerError, Result};
pub use handler::NotificationHandler;
pub use postgres::{PgNotificationConnector, PgNotificationTransport};
pub use subscriber::{NotificationSubscriber, SubscriberConfig, SubscriberHandle};
pub use transport::{Notification, NotificationTransport, TransportConnector};
