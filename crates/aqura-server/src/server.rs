use std::sync::Arc;

use anyhow::Context;
use aqura_cache::spawn_sweeper;
use aqura_listener::{
    InvalidationDispatcher, NotificationSubscriber, PgNotificationConnector, SubscriberHandle,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{config::AppConfig, pool::create_pool, state::AppState};

pub struct AquraServer {
    state: AppState,
    subscriber: SubscriberHandle,
    sweeper: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Connect to the database, create the shared cache and start listening
    /// for change notifications. Any failure here is a startup error.
    pub async fn build(self) -> anyhow::Result<AquraServer> {
        let cfg = self.config;

        let pool = create_pool(&cfg.database)
            .await
            .context("failed to connect to PostgreSQL")?;

        let state = AppState::new(cfg, pool);
        let cfg = Arc::clone(&state.config);
        let cancel = CancellationToken::new();

        let sweeper = cfg.sweep_interval().map(|every| {
            spawn_sweeper(Arc::clone(&state.cache), every, cancel.child_token())
        });

        let dispatcher = InvalidationDispatcher::with_default_rules(state.cache.clone())
            .with_clear_on_resync(cfg.listener.clear_on_resync);
        let subscriber_config = cfg.subscriber_config(dispatcher.channels());
        let connector = PgNotificationConnector::new(state.db_pool.clone());

        let subscriber = match NotificationSubscriber::new(connector, subscriber_config)
            .start(dispatcher)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                cancel.cancel();
                return Err(e).context("failed to start change notification listener");
            }
        };

        Ok(AquraServer {
            state,
            subscriber,
            sweeper,
            cancel,
        })
    }
}

impl AquraServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run until Ctrl+C, then shut down.
    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("aqura server running");
        shutdown_signal().await;
        self.shutdown().await
    }

    /// Stop the listener and sweeper and close the pool.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.subscriber.shutdown().await;

        self.cancel.cancel();
        if let Some(sweeper) = self.sweeper {
            sweeper.await.context("cache sweeper terminated abnormally")?;
        }

        let stats = self.state.cache.stats();
        tracing::info!(
            size = stats.size,
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            "cache statistics at shutdown"
        );

        self.state.db_pool.close().await;
        tracing::info!("shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
