//! Consumer-facing entry point: a cancellable stream of notifications backed
//! by a supervised subscription worker.

use futures::Stream;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::core::message::Notification;
use crate::core::queue::{delivery_queue, QueueConsumer};
use crate::core::subscription::{spawn_worker, SubscriptionOptions, WorkerHandle};
use crate::store::{Connector, PgConnector};

/// Listen on `channel` of the PostgreSQL server at `target` with default
/// options. Must be called from within a tokio runtime.
pub fn listen(target: impl Into<String>, channel: impl Into<String>, cancel: CancellationToken) -> Listener {
    listen_with(
        PgConnector::new(target),
        channel,
        SubscriptionOptions::default(),
        cancel,
    )
}

/// Listen through any [`Connector`] with explicit options.
pub fn listen_with<C: Connector>(
    connector: C,
    channel: impl Into<String>,
    options: SubscriptionOptions,
    cancel: CancellationToken,
) -> Listener {
    let (producer, consumer) = delivery_queue(options.queue_capacity, options.overflow_policy);
    let worker = spawn_worker(connector, channel, options, producer, cancel.clone());
    Listener {
        consumer,
        worker,
        cancel,
    }
}

/// Consumer end of one subscription.
///
/// Never yields errors: the stream carries notifications in arrival order and
/// ends only when the cancellation token fires.
#[derive(Debug)]
pub struct Listener {
    consumer: QueueConsumer,
    worker: WorkerHandle,
    cancel: CancellationToken,
}

impl Listener {
    /// Next notification, or `None` after cancellation.
    pub async fn recv(&self) -> Option<Notification> {
        self.consumer.recv(&self.cancel).await
    }

    pub fn stream(&self) -> impl Stream<Item = Notification> + Send + 'static {
        self.consumer.stream(self.cancel.clone())
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    pub fn queued(&self) -> usize {
        self.consumer.len()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel and wait for the worker to close its connection and exit.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.worker.shutdown().await
    }
}
