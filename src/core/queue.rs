//! Delivery queue.
//!
//! Bridges the subscription worker (single producer) and the caller's
//! iteration (single consumer) through a bounded FIFO. The default policy
//! blocks the producer when the queue is full, so backpressure travels up into
//! the worker's wait loop instead of messages being discarded.

use std::fmt;
use std::str::FromStr;

use futures::Stream;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::error::SubscribeError;
use crate::core::message::Notification;

/// What the producer does when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the producer until the consumer frees a slot.
    #[default]
    Block,
    /// Discard the incoming notification.
    DropNew,
    /// Evict the oldest queued notification to make room.
    DropOldest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop_new" => Ok(OverflowPolicy::DropNew),
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!("unknown overflow policy `{other}`")),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropNew => "drop_new",
            OverflowPolicy::DropOldest => "drop_oldest",
        })
    }
}

/// Result of a successful enqueue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Stored,
    /// The queue was full and the incoming notification was discarded.
    DroppedNew,
    /// Stored after evicting the oldest queued notification.
    EvictedOldest,
}

/// Create a bounded delivery queue. A zero capacity is raised to one.
pub fn delivery_queue(capacity: usize, policy: OverflowPolicy) -> (QueueProducer, QueueConsumer) {
    let capacity = capacity.max(1);
    let (tx, rx) = flume::bounded(capacity);
    let evict = match policy {
        OverflowPolicy::DropOldest => Some(rx.clone()),
        _ => None,
    };
    (
        QueueProducer {
            tx,
            evict,
            policy,
            capacity,
        },
        QueueConsumer { rx, capacity },
    )
}

/// Producing half, owned by the subscription worker.
#[derive(Debug)]
pub struct QueueProducer {
    tx: flume::Sender<Notification>,
    // Only held under DropOldest, so it must not count as a live consumer.
    evict: Option<flume::Receiver<Notification>>,
    policy: OverflowPolicy,
    capacity: usize,
}

impl QueueProducer {
    /// Enqueue according to the configured policy.
    ///
    /// Under [`OverflowPolicy::Block`] this suspends until a slot frees and
    /// never drops the notification.
    pub async fn enqueue(&self, notification: Notification) -> Result<Enqueued, SubscribeError> {
        match self.policy {
            OverflowPolicy::Block => self
                .tx
                .send_async(notification)
                .await
                .map(|_| Enqueued::Stored)
                .map_err(|_| SubscribeError::QueueClosed),
            _ => self.try_enqueue(notification),
        }
    }

    /// Enqueue without suspending.
    ///
    /// A full queue yields [`SubscribeError::QueueFull`] under `Block`; the
    /// dropping policies resolve it themselves.
    pub fn try_enqueue(&self, notification: Notification) -> Result<Enqueued, SubscribeError> {
        let mut pending = notification;
        let mut evicted = false;
        loop {
            if self.consumer_gone() {
                return Err(SubscribeError::QueueClosed);
            }
            match self.tx.try_send(pending) {
                Ok(()) if evicted => return Ok(Enqueued::EvictedOldest),
                Ok(()) => return Ok(Enqueued::Stored),
                Err(flume::TrySendError::Disconnected(_)) => return Err(SubscribeError::QueueClosed),
                Err(flume::TrySendError::Full(back)) => match (self.policy, &self.evict) {
                    (OverflowPolicy::DropOldest, Some(evict)) => {
                        let _ = evict.try_recv();
                        evicted = true;
                        pending = back;
                    }
                    (OverflowPolicy::DropNew, _) => return Ok(Enqueued::DroppedNew),
                    _ => return Err(SubscribeError::QueueFull),
                },
            }
        }
    }

    fn consumer_gone(&self) -> bool {
        let own = usize::from(self.evict.is_some());
        self.tx.receiver_count() <= own
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Consuming half, owned by the caller.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: flume::Receiver<Notification>,
    capacity: usize,
}

impl QueueConsumer {
    /// Wait for the next notification, or `None` once `cancel` fires.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<Notification> {
        next_or_cancelled(&self.rx, cancel).await
    }

    /// Take a notification that is already queued.
    pub fn try_recv(&self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// A lazy stream over the queue that ends when `cancel` fires.
    ///
    /// Each call starts a fresh stream over the same queue; items taken by one
    /// stream are not seen by another.
    pub fn stream(&self, cancel: CancellationToken) -> impl Stream<Item = Notification> + Send + 'static {
        let rx = self.rx.clone();
        futures::stream::unfold((rx, cancel), |(rx, cancel)| async move {
            let next = next_or_cancelled(&rx, &cancel).await?;
            Some((next, (rx, cancel)))
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

async fn next_or_cancelled(
    rx: &flume::Receiver<Notification>,
    cancel: &CancellationToken,
) -> Option<Notification> {
    // Cancellation wins even when items are still queued.
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        next = rx.recv_async() => next.ok(),
    }
}
