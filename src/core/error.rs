use thiserror::Error;

/// Failures inside a single subscription attempt.
///
/// None of these reach the consumer: the worker catches them at the attempt
/// boundary, logs them and reconnects after the retry delay. A wait that
/// elapses without a notification is not an error at all (see
/// [`NotifyConnection::wait`](crate::store::NotifyConnection::wait)).
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The store was unreachable or rejected the credentials.
    #[error("connection error: {0}")]
    Connection(String),

    /// The channel registration was malformed or refused.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An established connection went away.
    #[error("connection lost")]
    ConnectionLost,

    /// Non-blocking enqueue hit a full queue.
    #[error("delivery queue is full")]
    QueueFull,

    /// The consuming side of the delivery queue was dropped.
    #[error("delivery queue is closed")]
    QueueClosed,

    /// The cancellation token fired at a suspension point.
    #[error("subscription cancelled")]
    Cancelled,
}

impl SubscribeError {
    pub fn connection(err: impl std::fmt::Display) -> Self {
        SubscribeError::Connection(err.to_string())
    }

    pub fn protocol(err: impl std::fmt::Display) -> Self {
        SubscribeError::Protocol(err.to_string())
    }

    /// Errors that end the worker instead of scheduling another attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscribeError::Cancelled | SubscribeError::QueueClosed)
    }
}
