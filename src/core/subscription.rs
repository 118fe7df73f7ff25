//! Subscription worker.
//!
//! Owns one logical subscription and keeps the channel registered for as long
//! as the cancellation token allows. Each attempt opens a connection, issues
//! `LISTEN`, then alternates keep-alive polls with bounded waits, feeding every
//! notification into the delivery queue. Any failure closes the connection,
//! waits a flat retry delay and starts over.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::core::error::SubscribeError;
use crate::core::message::Notification;
use crate::core::queue::{Enqueued, OverflowPolicy, QueueProducer};
use crate::store::{Connector, NotifyConnection};
use crate::util::backoff::FixedBackoff;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Random identifier attached to every log line of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub retry_delay: Duration,
    pub wait_timeout: Duration,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::Block,
        }
    }
}

/// Lifecycle of the worker. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    Connecting,
    Registering,
    Listening,
    Stopped,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubscriptionState::Disconnected => "disconnected",
            SubscriptionState::Connecting => "connecting",
            SubscriptionState::Registering => "registering",
            SubscriptionState::Listening => "listening",
            SubscriptionState::Stopped => "stopped",
        })
    }
}

/// Counters updated by the worker, readable from any handle.
#[derive(Debug, Default)]
pub struct WorkerStats {
    attempts: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl WorkerStats {
    /// Connection attempts started, including the first.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Notifications handed to the delivery queue.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Notifications discarded by a dropping overflow policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct Subscription<C: Connector> {
    id: SubscriptionId,
    connector: C,
    channel: String,
    options: SubscriptionOptions,
    backoff: FixedBackoff,
    producer: QueueProducer,
    cancel: CancellationToken,
    state: watch::Sender<SubscriptionState>,
    stats: Arc<WorkerStats>,
}

impl<C: Connector> Subscription<C> {
    pub fn new(
        connector: C,
        channel: impl Into<String>,
        options: SubscriptionOptions,
        producer: QueueProducer,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Disconnected);
        Self {
            id: SubscriptionId::new(),
            connector,
            channel: channel.into(),
            backoff: FixedBackoff::new(options.retry_delay),
            options,
            producer,
            cancel,
            state,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let id = self.id;
        let state = self.state();
        let stats = self.stats();
        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.run());
        WorkerHandle {
            id,
            state,
            stats,
            cancel,
            join,
        }
    }

    /// Drive the subscription until cancelled.
    ///
    /// Never fails: every attempt error becomes a retry after the fixed delay.
    pub async fn run(self) {
        let span = info_span!("subscription", id = %self.id, channel = %self.channel);
        async move {
            info!(
                server = %self.connector.describe(),
                retry_delay = ?self.options.retry_delay,
                wait_timeout = ?self.options.wait_timeout,
                "starting subscription"
            );
            loop {
                if self.cancel.is_cancelled() {
                    break;
                }
                let attempt = self.stats.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                match self.attempt().await {
                    Ok(()) => break,
                    Err(e) if e.is_terminal() => {
                        if matches!(e, SubscribeError::QueueClosed) {
                            info!("consumer went away, nothing left to deliver to");
                        }
                        break;
                    }
                    Err(e) => {
                        self.set_state(SubscriptionState::Disconnected);
                        error!(attempt, "subscription attempt failed: {e}");
                        warn!("retrying in {:?}", self.backoff.delay());
                        if !self.backoff.wait(&self.cancel).await {
                            break;
                        }
                        info!(attempt = attempt + 1, "retrying subscription");
                    }
                }
            }
            self.set_state(SubscriptionState::Stopped);
            info!(
                delivered = self.stats.delivered(),
                dropped = self.stats.dropped(),
                "subscription stopped"
            );
        }
        .instrument(span)
        .await
    }

    /// One connect/register/wait cycle. `Ok` only when cancelled while listening.
    async fn attempt(&self) -> Result<(), SubscribeError> {
        self.set_state(SubscriptionState::Connecting);
        info!("opening connection");
        let conn = self.cancellable(self.connector.connect()).await?;

        let mut guard = ConnectionGuard::new(conn);
        let result = self.listen_on(guard.connection()).await;
        guard.close().await;
        result
    }

    async fn listen_on(&self, conn: &mut C::Connection) -> Result<(), SubscribeError> {
        self.set_state(SubscriptionState::Registering);
        self.cancellable(conn.listen(&self.channel)).await?;
        self.set_state(SubscriptionState::Listening);
        info!("listening for notifications");

        while !self.cancel.is_cancelled() {
            self.cancellable(conn.keep_alive()).await?;
            debug!("waiting for notification");
            match self.cancellable(conn.wait(self.options.wait_timeout)).await? {
                Some(notification) => self.deliver(notification).await?,
                None => trace!("wait timed out, polling again"),
            }
        }
        Ok(())
    }

    async fn deliver(&self, notification: Notification) -> Result<(), SubscribeError> {
        trace!(bytes = notification.payload().len(), "notification received");
        match self.cancellable(self.producer.enqueue(notification)).await? {
            Enqueued::Stored => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Enqueued::EvictedOldest => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("delivery queue full, evicted oldest notification");
            }
            Enqueued::DroppedNew => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("delivery queue full, dropped incoming notification");
            }
        }
        Ok(())
    }

    /// Race `fut` against the cancellation token.
    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, SubscribeError>>,
    ) -> Result<T, SubscribeError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SubscribeError::Cancelled),
            res = fut => res,
        }
    }

    fn set_state(&self, next: SubscriptionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "state transition");
        }
    }
}

/// Scoped owner of a live connection.
///
/// `close` is idempotent; if the guard is dropped without it (task aborted)
/// the connection is dropped with it, which releases the socket.
struct ConnectionGuard<T: NotifyConnection> {
    conn: T,
    closed: bool,
}

impl<T: NotifyConnection> ConnectionGuard<T> {
    fn new(conn: T) -> Self {
        Self { conn, closed: false }
    }

    fn connection(&mut self) -> &mut T {
        &mut self.conn
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!("closing connection");
        if let Err(e) = self.conn.close().await {
            warn!("error while closing connection: {e}");
        }
    }
}

impl<T: NotifyConnection> Drop for ConnectionGuard<T> {
    fn drop(&mut self) {
        if !self.closed {
            debug!("connection dropped without an orderly close");
        }
    }
}

/// Supervised handle to a spawned worker.
#[derive(Debug)]
pub struct WorkerHandle {
    id: SubscriptionId,
    state: watch::Receiver<SubscriptionState>,
    stats: Arc<WorkerStats>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// A receiver that observes every subsequent state change.
    pub fn state_changes(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker task to exit. Does not cancel it.
    pub async fn join(self) -> Result<(), JoinError> {
        self.join.await
    }

    /// Cancel the subscription, then wait for the worker to unwind.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.cancel.cancel();
        self.join().await
    }
}

/// Build and spawn a worker feeding `producer`.
pub fn spawn_worker<C: Connector>(
    connector: C,
    channel: impl Into<String>,
    options: SubscriptionOptions,
    producer: QueueProducer,
    cancel: CancellationToken,
) -> WorkerHandle {
    Subscription::new(connector, channel, options, producer, cancel).spawn()
}
