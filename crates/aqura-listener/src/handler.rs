use crate::transport::Notification;

/// Consumer of notifications, invoked on the subscriber's dispatch worker.
///
/// Calls arrive one at a time in transport delivery order. Implementations
/// should be quick and must not block on I/O: a slow handler only fills the
/// dispatch queue, but a full queue means notifications are dropped.
pub trait NotificationHandler: Send + Sync + 'static {
    /// Handle one notification.
    fn on_notification(&self, notification: &Notification);

    /// Called when notifications may have been missed: after a reconnect
    /// (anything sent while disconnected is gone) or after the dispatch
    /// queue overflowed.
    ///
    /// The default does nothing, which means missed notifications are simply
    /// lost. Handlers whose state must stay consistent with the database
    /// (caches in particular) should override it and discard that state.
    fn on_resync(&self) {}
}

/// Plain `Fn(channel, payload)` closures.
///
/// A closure has no resync hook: notifications dropped on reconnect or queue
/// overflow are not replayed or compensated. Use a type implementing
/// [`NotificationHandler::on_resync`] when that matters.
impl<F> NotificationHandler for F
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    fn on_notification(&self, notification: &Notification) {
        self(&notification.channel, &notification.payload)
    }
}
