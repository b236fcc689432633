//! Scripted in-memory transport for subscriber tests.
//!
//! Each call to [`ScriptedConnector::connect`] consumes the next queued
//! session. A session is driven through its [`SessionControl`]: pushing a
//! notification delivers it, dropping the control (or calling `disconnect`)
//! makes `recv` report a lost connection. Scripts can also make LISTEN or
//! ping hang forever.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use aqura_listener::{
    ListenerError, Notification, NotificationTransport, ReconnectPolicy, Result, SubscriberConfig,
    TransportConnector,
};
use tokio::sync::mpsc;

/// Behaviour of one scripted connection.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    /// LISTEN on this channel fails.
    pub fail_listen: Option<String>,
    /// Every ping fails.
    pub fail_ping: bool,
    /// LISTEN never completes.
    pub hang_listen: bool,
    /// Pings never complete.
    pub hang_ping: bool,
}

/// Shared view of what a session observed.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub listened: Mutex<Vec<String>>,
    pub pings: AtomicUsize,
}

pub struct SessionControl {
    sender: Option<mpsc::UnboundedSender<Notification>>,
    pub log: Arc<SessionLog>,
}

impl SessionControl {
    pub fn notify(&self, channel: &str, payload: &str) {
        self.sender
            .as_ref()
            .expect("session already disconnected")
            .send(Notification::new(channel, payload))
            .expect("transport dropped");
    }

    pub fn disconnect(&mut self) {
        self.sender = None;
    }

    pub fn listened(&self) -> Vec<String> {
        self.log.listened.lock().unwrap().clone()
    }

    pub fn pings(&self) -> usize {
        self.log.pings.load(Ordering::SeqCst)
    }
}

struct ScriptedTransport {
    receiver: mpsc::UnboundedReceiver<Notification>,
    script: SessionScript,
    log: Arc<SessionLog>,
}

#[async_trait]
impl NotificationTransport for ScriptedTransport {
    async fn listen(&mut self, channel: &str) -> Result<()> {
        if self.script.hang_listen {
            std::future::pending::<()>().await;
        }
        if self.script.fail_listen.as_deref() == Some(channel) {
            return Err(ListenerError::subscribe(channel, "permission denied"));
        }
        self.log.listened.lock().unwrap().push(channel.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Notification> {
        // mpsc::UnboundedReceiver::recv is cancel-safe.
        self.receiver.recv().await.ok_or(ListenerError::ConnectionLost)
    }

    async fn ping(&mut self) -> Result<()> {
        self.log.pings.fetch_add(1, Ordering::SeqCst);
        if self.script.hang_ping {
            std::future::pending::<()>().await;
        }
        if self.script.fail_ping {
            Err(ListenerError::ConnectionLost)
        } else {
            Ok(())
        }
    }
}

enum Slot {
    Session(ScriptedTransport),
    Refuse,
}

/// Connector handing out queued sessions; refuses when the queue is empty.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    slots: Arc<Mutex<VecDeque<Slot>>>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a healthy session.
    pub fn session(&self) -> SessionControl {
        self.scripted_session(SessionScript::default())
    }

    pub fn scripted_session(&self, script: SessionScript) -> SessionControl {
        let (sender, receiver) = mpsc::unbounded_channel();
        let log = Arc::new(SessionLog::default());
        self.slots.lock().unwrap().push_back(Slot::Session(ScriptedTransport {
            receiver,
            script,
            log: Arc::clone(&log),
        }));
        SessionControl {
            sender: Some(sender),
            log,
        }
    }

    /// Queue one refused connection attempt.
    pub fn refuse(&self) {
        self.slots.lock().unwrap().push_back(Slot::Refuse);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn NotificationTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.slots.lock().unwrap().pop_front() {
            Some(Slot::Session(transport)) => Ok(Box::new(transport)),
            Some(Slot::Refuse) | None => Err(ListenerError::ConnectionLost),
        }
    }
}

/// Subscriber settings scaled down to milliseconds.
pub fn fast_config(channels: &[&str]) -> SubscriberConfig {
    SubscriberConfig::new(channels.iter().copied())
        .with_idle_timeout(Duration::from_secs(5))
        .with_ping_timeout(Duration::from_millis(100))
        .with_connect_timeout(Duration::from_millis(100))
        .with_reconnect(ReconnectPolicy::new(
            Duration::from_millis(5),
            Duration::from_millis(20),
        ))
        .with_queue_capacity(64)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
