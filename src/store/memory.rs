//! In-process notification store.
//!
//! Mirrors the behaviour the subscription worker relies on from PostgreSQL:
//! per-connection FIFO delivery, channel registration, and connections that
//! can be severed or refused. Tests and demos drive it directly.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{validate_channel, Connector, NotifyConnection};
use crate::core::error::SubscribeError;
use crate::core::message::Notification;

#[derive(Debug)]
struct Peer {
    channel: Option<String>,
    tx: mpsc::UnboundedSender<Notification>,
}

#[derive(Debug)]
struct Shared {
    reachable: AtomicBool,
    connect_latency_ms: AtomicU64,
    next_peer: AtomicU64,
    connect_attempts: AtomicUsize,
    open: AtomicUsize,
    peers: DashMap<u64, Peer>,
}

/// Cheaply cloneable handle; clones share the same store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                reachable: AtomicBool::new(true),
                connect_latency_ms: AtomicU64::new(0),
                next_peer: AtomicU64::new(1),
                connect_attempts: AtomicUsize::new(0),
                open: AtomicUsize::new(0),
                peers: DashMap::new(),
            }),
        }
    }

    /// While unreachable, every connect attempt fails.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delay applied to each connect attempt before it resolves.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.shared
            .connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Push `payload` to every connection listening on `channel`.
    ///
    /// Returns how many connections received it.
    pub fn notify(&self, channel: &str, payload: impl Into<String>) -> usize {
        let notification = Notification::new(channel, payload).with_process_id(std::process::id());
        self.shared
            .peers
            .iter()
            .filter(|peer| peer.channel.as_deref() == Some(channel))
            .filter(|peer| peer.tx.send(notification.clone()).is_ok())
            .count()
    }

    /// Sever every live connection, as if the server restarted.
    ///
    /// Notifications already buffered on a connection are still handed out
    /// before it reports the loss.
    pub fn drop_connections(&self) -> usize {
        let severed = self.shared.peers.len();
        self.shared.peers.clear();
        severed
    }

    /// Connections opened and not yet closed or dropped.
    pub fn open_connections(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Connections currently registered on `channel`.
    pub fn listeners(&self, channel: &str) -> usize {
        self.shared
            .peers
            .iter()
            .filter(|peer| peer.channel.as_deref() == Some(channel))
            .count()
    }
}

#[async_trait]
impl Connector for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection, SubscribeError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let latency = self.shared.connect_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.shared.reachable.load(Ordering::SeqCst) {
            return Err(SubscribeError::connection("memory store is unreachable"));
        }

        let id = self.shared.next_peer.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.peers.insert(id, Peer { channel: None, tx });
        self.shared.open.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryConnection {
            id,
            rx,
            shared: Arc::clone(&self.shared),
            closed: false,
        })
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    rx: mpsc::UnboundedReceiver<Notification>,
    shared: Arc<Shared>,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_live(&self) -> Result<(), SubscribeError> {
        if self.closed || !self.shared.peers.contains_key(&self.id) {
            return Err(SubscribeError::ConnectionLost);
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.peers.remove(&self.id);
            self.shared.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl NotifyConnection for MemoryConnection {
    async fn listen(&mut self, channel: &str) -> Result<(), SubscribeError> {
        validate_channel(channel)?;
        match self.shared.peers.get_mut(&self.id) {
            Some(mut peer) if !self.closed => {
                peer.channel = Some(channel.to_string());
                Ok(())
            }
            _ => Err(SubscribeError::ConnectionLost),
        }
    }

    async fn keep_alive(&mut self) -> Result<(), SubscribeError> {
        // Anything already received must be handed out before the loss shows.
        if !self.closed && !self.rx.is_empty() {
            return Ok(());
        }
        self.ensure_live()
    }

    async fn wait(&mut self, timeout: Duration) -> Result<Option<Notification>, SubscribeError> {
        if self.closed {
            return Err(SubscribeError::ConnectionLost);
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Some(n)) => Ok(Some(n)),
            Ok(None) => Err(SubscribeError::ConnectionLost),
        }
    }

    async fn close(&mut self) -> Result<(), SubscribeError> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}
