//! PostgreSQL LISTEN/NOTIFY transport.
//!
//! Every transport is a `PgListener` holding one connection checked out of
//! the pool. The listener is used in explicit-reconnect mode: a
//! lost connection surfaces as [`ListenerError::ConnectionLost`] and the
//! subscriber builds a new transport with its own backoff, instead of sqlx
//! silently reconnecting and dropping whatever was sent in between.

use async_trait::async_trait;
use sqlx_postgres::{PgListener, PgPool};
use tracing::debug;

use crate::error::{ListenerError, Result};
use crate::transport::{Notification, NotificationTransport, TransportConnector};

/// Keepalive statement; the cheapest round trip on the listener connection.
const PING_SQL: &str = "SELECT 1";

/// [`NotificationTransport`] over a single `PgListener` connection.
pub struct PgNotificationTransport {
    listener: PgListener,
}

impl PgNotificationTransport {
    pub fn new(listener: PgListener) -> Self {
        Self { listener }
    }
}

#[async_trait]
impl NotificationTransport for PgNotificationTransport {
    async fn listen(&mut self, channel: &str) -> Result<()> {
        self.listener
            .listen(channel)
            .await
            .map_err(|e| ListenerError::subscribe(channel, e))
    }

    async fn recv(&mut self) -> Result<Notification> {
        match self.listener.try_recv().await? {
            Some(notification) => {
                debug!(
                    channel = %notification.channel(),
                    payload = %notification.payload(),
                    "Received NOTIFY"
                );
                Ok(Notification::new(
                    notification.channel(),
                    notification.payload(),
                ))
            }
            None => Err(ListenerError::ConnectionLost),
        }
    }

    async fn ping(&mut self) -> Result<()> {
        sqlx_core::query::query(PING_SQL)
            .execute(&mut self.listener)
            .await?;
        Ok(())
    }
}

/// Opens LISTEN connections from a pool.
///
/// Each live transport keeps one pooled connection checked out until it is
/// dropped, so the pool must be sized for it.
#[derive(Clone)]
pub struct PgNotificationConnector {
    pool: PgPool,
}

impl PgNotificationConnector {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransportConnector for PgNotificationConnector {
    async fn connect(&self) -> Result<Box<dyn NotificationTransport>> {
        let listener = PgListener::connect_with(&self.pool).await?;
        Ok(Box::new(PgNotificationTransport::new(listener)))
    }
}
