use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ExpiringCache;

/// Start a background task that periodically drops expired entries.
///
/// Reads already ignore expired entries, so the sweeper only bounds memory
/// held by keys that are written once and never read or invalidated again.
/// The task runs until `cancel` is triggered.
pub fn spawn_sweeper<V>(
    cache: Arc<ExpiringCache<V>>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "Cache sweeper started");

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Cache sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = cache.cleanup_expired();
                    if removed > 0 {
                        debug!(removed, remaining = cache.len(), "Swept expired cache entries");
                    }
                }
            }
        }
    })
}
