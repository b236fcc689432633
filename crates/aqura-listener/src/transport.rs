//! Publish/subscribe transport abstraction.
//!
//! The subscriber only needs three primitives from the notification source:
//! subscribe to a channel, wait for the next event and send a keepalive. A
//! [`TransportConnector`] produces fresh transports, which is how the
//! subscriber reconnects after a failure.

use async_trait::async_trait;

use crate::error::Result;

/// A single change event: the channel it arrived on and its opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

impl Notification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// One live connection to the notification source.
#[async_trait]
pub trait NotificationTransport: Send {
    /// Subscribe to `channel`. Subscribing twice is harmless.
    async fn listen(&mut self, channel: &str) -> Result<()>;

    /// Wait for the next notification, in delivery order.
    ///
    /// Must be cancel-safe: the subscriber races this future against its
    /// idle timer and shutdown signal, and dropping it must not lose a
    /// notification that has not been returned yet.
    ///
    /// Returns [`ListenerError::ConnectionLost`](crate::ListenerError::ConnectionLost)
    /// (or another error) once the connection is unusable.
    async fn recv(&mut self) -> Result<Notification>;

    /// Lightweight round trip used to detect silently dead connections.
    async fn ping(&mut self) -> Result<()>;
}

/// Factory for transports, called once at startup and again on every
/// reconnect attempt.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn NotificationTransport>>;
}
