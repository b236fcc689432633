//! Error types for the notification subscriber.

/// Errors that can occur while subscribing to or receiving notifications.
///
/// Only errors from the initial subscription are ever returned to callers;
/// once the subscriber is running, every variant is logged and answered with
/// a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// LISTEN on a channel was rejected.
    #[error("Failed to listen on channel '{channel}': {source}")]
    Subscribe {
        channel: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The transport reported that its connection is gone.
    #[error("Notification connection lost")]
    ConnectionLost,

    /// Connecting and subscribing did not complete in time.
    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// A keepalive ping did not complete in time.
    #[error("Keepalive ping timed out after {0:?}")]
    PingTimeout(std::time::Duration),

    /// Invalid subscriber configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ListenerError {
    pub fn subscribe(
        channel: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Subscribe {
            channel: channel.into(),
            source: source.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for listener operations.
pub type Result<T> = std::result::Result<T, ListenerError>;
