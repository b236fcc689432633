//! Long-lived change notification subscriber.
//!
//! ## Tasks
//!
//! ```text
//!               ┌──────────────── receive loop ────────────────┐
//! transport ───▶│ select { cancel | recv | idle timer → ping } │──try_send──▶ bounded queue ──▶ dispatch worker ──▶ handler
//!               │ on failure: backoff → connect → LISTEN all   │
//!               └──────────────────────────────────────────────┘
//! ```
//!
//! The receive loop never awaits the handler. It posts each notification to a
//! bounded queue and immediately goes back to the transport, so a slow
//! handler cannot delay detection of a dead connection. If the queue is full
//! the notification is dropped and the worker is told to resynchronize.
//!
//! Every connection attempt (connect plus LISTEN on all channels) is bounded
//! by `connect_timeout`; an attempt that hangs counts as a failed one.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::ReconnectPolicy;
use crate::error::{ListenerError, Result};
use crate::handler::NotificationHandler;
use crate::transport::{Notification, NotificationTransport, TransportConnector};

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Channels to LISTEN on, in registration order, without duplicates.
    pub channels: Vec<String>,
    /// Send a keepalive ping after this long without a notification.
    pub idle_timeout: Duration,
    /// How long a keepalive ping may take before the connection is declared dead.
    pub ping_timeout: Duration,
    /// How long one connection attempt (connect and LISTEN on every channel)
    /// may take before it is abandoned.
    pub connect_timeout: Duration,
    /// Backoff between reconnect attempts.
    pub reconnect: ReconnectPolicy,
    /// Capacity of the queue between the receive loop and the dispatch worker.
    pub queue_capacity: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            idle_timeout: Duration::from_secs(90),
            ping_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            queue_capacity: 256,
        }
    }
}

impl SubscriberConfig {
    /// Default settings for the given channels. Duplicates are dropped,
    /// keeping the first occurrence.
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().with_channels(channels)
    }

    #[must_use]
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels.clear();
        for channel in channels {
            let channel = channel.into();
            if !self.channels.contains(&channel) {
                self.channels.push(channel);
            }
        }
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(ListenerError::config("at least one channel is required"));
        }
        if self.channels.iter().any(|c| c.trim().is_empty()) {
            return Err(ListenerError::config("channel names must not be empty"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ListenerError::config("idle_timeout must be > 0"));
        }
        if self.ping_timeout.is_zero() {
            return Err(ListenerError::config("ping_timeout must be > 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ListenerError::config("connect_timeout must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(ListenerError::config("queue_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Change notification subscriber.
///
/// # Example
///
/// ```ignore
/// use aqura_listener::{NotificationSubscriber, PgNotificationConnector, SubscriberConfig};
///
/// let config = SubscriberConfig::new(["branches_changed", "cache_invalidate"]);
/// let subscriber = NotificationSubscriber::new(PgNotificationConnector::new(pool), config);
///
/// let handle = subscriber
///     .start(|channel: &str, payload: &str| {
///         println!("{channel}: {payload}");
///     })
///     .await?;
///
/// // ... on shutdown
/// handle.shutdown().await;
/// ```
pub struct NotificationSubscriber<C> {
    connector: Arc<C>,
    config: SubscriberConfig,
}

impl<C> NotificationSubscriber<C>
where
    C: TransportConnector + 'static,
{
    #[must_use]
    pub fn new(connector: C, config: SubscriberConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
        }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    /// Connect, LISTEN on every configured channel and start the background
    /// tasks.
    ///
    /// Failing to connect or to LISTEN on any channel, or not finishing within
    /// `connect_timeout`, is returned as an error and nothing is spawned. After
    /// a successful start, connection failures are never surfaced again: they
    /// are logged and retried indefinitely.
    #[instrument(skip_all, name = "notification_subscriber")]
    pub async fn start<H>(self, handler: H) -> Result<SubscriberHandle>
    where
        H: NotificationHandler,
    {
        self.config.validate()?;

        let transport = establish(
            self.connector.as_ref(),
            &self.config.channels,
            self.config.connect_timeout,
        )
        .await?;

        info!(
            channels = ?self.config.channels,
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            "Notification subscriber started"
        );

        let (queue, deliveries) = mpsc::channel(self.config.queue_capacity);
        let lagged = Arc::new(LagFlag::default());
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(dispatch_worker(deliveries, handler, Arc::clone(&lagged)));

        let receive_loop = ReceiveLoop {
            connector: self.connector,
            config: self.config,
            queue,
            lagged,
            cancel: cancel.clone(),
        };
        let receiver = tokio::spawn(receive_loop.run(transport));

        Ok(SubscriberHandle {
            cancel,
            receiver,
            worker,
        })
    }
}

/// Handle to a running subscriber.
///
/// Dropping the handle does not stop the subscriber; it keeps running until
/// [`shutdown`](Self::shutdown) is called or its cancellation token fires.
pub struct SubscriberHandle {
    cancel: CancellationToken,
    receiver: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Token that stops the subscriber when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.receiver.is_finished() && self.worker.is_finished()
    }

    /// Stop receiving, release the connection and wait until every queued
    /// notification has been handled.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        if let Err(e) = self.receiver.await {
            error!(error = %e, "Notification receive loop terminated abnormally");
        }
        if let Err(e) = self.worker.await {
            error!(error = %e, "Notification dispatch worker terminated abnormally");
        }
    }
}

/// Item on the dispatch queue.
#[derive(Debug)]
enum Delivery {
    Event(Notification),
    Resync,
}

/// Set by the receive loop when it drops a notification; cleared by the
/// worker when it resyncs. Raising it also wakes an idle worker, so a resync
/// never waits for the next delivery.
#[derive(Default)]
struct LagFlag {
    raised: AtomicBool,
    signal: Notify,
}

impl LagFlag {
    fn raise(&self) {
        self.raised.store(true, Ordering::Release);
        self.signal.notify_one();
    }

    fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
}

/// Why the receive loop left its inner loop.
enum LoopExit {
    Shutdown,
    Disconnected(ListenerError),
}

/// Outcome of one wait on the transport.
enum Step {
    Cancelled,
    Received(Result<Notification>),
    Idle,
}

struct ReceiveLoop<C> {
    connector: Arc<C>,
    config: SubscriberConfig,
    queue: mpsc::Sender<Delivery>,
    lagged: Arc<LagFlag>,
    cancel: CancellationToken,
}

impl<C> ReceiveLoop<C>
where
    C: TransportConnector + 'static,
{
    async fn run(self, mut transport: Box<dyn NotificationTransport>) {
        loop {
            let failure = match self.pump(transport.as_mut()).await {
                LoopExit::Shutdown => break,
                LoopExit::Disconnected(e) => e,
            };

            warn!(error = %failure, "Notification connection failed, reconnecting");
            drop(transport);

            match self.reconnect().await {
                Some(fresh) => {
                    transport = fresh;
                    // Anything published while we were away is lost.
                    if !self.post(Delivery::Resync) {
                        break;
                    }
                }
                None => break,
            }
        }

        info!("Notification subscriber stopped");
    }

    /// Deliver notifications until the connection fails or shutdown is
    /// requested.
    async fn pump(&self, transport: &mut dyn NotificationTransport) -> LoopExit {
        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                received = transport.recv() => Step::Received(received),
                _ = sleep(self.config.idle_timeout) => Step::Idle,
            };

            match step {
                Step::Cancelled => return LoopExit::Shutdown,
                Step::Received(Ok(notification)) => {
                    debug!(
                        channel = %notification.channel,
                        payload = %notification.payload,
                        "Received notification"
                    );
                    if !self.post(Delivery::Event(notification)) {
                        return LoopExit::Shutdown;
                    }
                }
                Step::Received(Err(e)) => return LoopExit::Disconnected(e),
                Step::Idle => {
                    if let Err(e) = self.keepalive(transport).await {
                        return LoopExit::Disconnected(e);
                    }
                }
            }
        }
    }

    /// Keepalive ping after an idle window. A failed or hung ping is treated
    /// as a dead connection.
    async fn keepalive(&self, transport: &mut dyn NotificationTransport) -> Result<()> {
        debug!(
            idle_secs = self.config.idle_timeout.as_secs(),
            "No notifications within idle window, pinging"
        );

        match timeout(self.config.ping_timeout, transport.ping()).await {
            Ok(Ok(())) => {
                debug!("Keepalive ping succeeded");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Keepalive ping failed");
                Err(e)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.ping_timeout.as_millis() as u64,
                    "Keepalive ping timed out"
                );
                Err(ListenerError::PingTimeout(self.config.ping_timeout))
            }
        }
    }

    /// Reconnect with backoff until it succeeds or shutdown is requested.
    async fn reconnect(&self) -> Option<Box<dyn NotificationTransport>> {
        let mut attempt: u32 = 0;

        loop {
            let delay = self.config.reconnect.delay_for(attempt);
            attempt = attempt.saturating_add(1);

            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting notification listener"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = sleep(delay) => {}
            }

            let attempt_future = establish(
                self.connector.as_ref(),
                &self.config.channels,
                self.config.connect_timeout,
            );
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                outcome = attempt_future => outcome,
            };

            match outcome {
                Ok(transport) => {
                    info!(
                        attempt,
                        channels = ?self.config.channels,
                        "Notification listener reconnected"
                    );
                    return Some(transport);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }
    }

    /// Hand a delivery to the worker without waiting. Returns `false` once the
    /// worker is gone.
    fn post(&self, delivery: Delivery) -> bool {
        match self.queue.try_send(delivery) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                self.lagged.raise();
                match dropped {
                    Delivery::Event(notification) => warn!(
                        channel = %notification.channel,
                        capacity = self.config.queue_capacity,
                        "Dispatch queue full, dropping notification"
                    ),
                    Delivery::Resync => warn!(
                        capacity = self.config.queue_capacity,
                        "Dispatch queue full, deferring resync"
                    ),
                }
                true
            }
            Err(TrySendError::Closed(_)) => {
                error!("Dispatch worker stopped, shutting down subscriber");
                false
            }
        }
    }
}

/// Open a transport and LISTEN on every channel, giving up after `limit`.
async fn establish<C>(
    connector: &C,
    channels: &[String],
    limit: Duration,
) -> Result<Box<dyn NotificationTransport>>
where
    C: TransportConnector + ?Sized,
{
    let attempt = async {
        let mut transport = connector.connect().await?;

        for channel in channels {
            transport.listen(channel).await?;
            info!(channel = %channel, "Listening for notifications");
        }

        Ok::<_, ListenerError>(transport)
    };

    match timeout(limit, attempt).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ListenerError::ConnectTimeout(limit)),
    }
}

async fn dispatch_worker<H>(
    mut deliveries: mpsc::Receiver<Delivery>,
    handler: H,
    lagged: Arc<LagFlag>,
) where
    H: NotificationHandler,
{
    loop {
        let delivery = tokio::select! {
            biased;
            delivery = deliveries.recv() => match delivery {
                Some(delivery) => Some(delivery),
                None => break,
            },
            _ = lagged.signal.notified() => None,
        };

        match delivery {
            Some(Delivery::Event(notification)) => {
                guarded(&notification.channel, || handler.on_notification(&notification));
            }
            Some(Delivery::Resync) => {
                info!("Resynchronizing after reconnect");
                guarded("resync", || handler.on_resync());
            }
            None => {}
        }

        if lagged.take() {
            warn!("Notifications were dropped, resynchronizing");
            guarded("resync", || handler.on_resync());
        }
    }

    // The queue closed before a late raise was picked up.
    if lagged.take() {
        warn!("Notifications were dropped, resynchronizing");
        guarded("resync", || handler.on_resync());
    }
    debug!("Dispatch worker stopped");
}

/// Run a handler callback, containing panics so the worker keeps going.
fn guarded(context: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        error!(
            context = %context,
            panic = %panic_message(panic.as_ref()),
            "Notification handler panicked"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
