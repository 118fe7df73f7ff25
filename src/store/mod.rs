//! Backing-store seam.
//!
//! A [`Connector`] opens connections; a [`NotifyConnection`] registers
//! interest in one channel and hands back pushed payloads one at a time. The
//! subscription worker only talks to these traits, so the PostgreSQL backend
//! and the in-process [`memory::MemoryStore`] are interchangeable.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::SubscribeError;
use crate::core::message::Notification;

pub use memory::MemoryStore;
pub use postgres::PgConnector;

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_CHANNEL_LEN: usize = 63;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: NotifyConnection;

    /// Open a fresh connection. Unreachable targets and rejected credentials
    /// surface as [`SubscribeError::Connection`].
    async fn connect(&self) -> Result<Self::Connection, SubscribeError>;

    /// Human-readable target for logs, with secrets masked.
    fn describe(&self) -> String;
}

#[async_trait]
pub trait NotifyConnection: Send + 'static {
    /// Register interest in `channel` (the `LISTEN` command).
    async fn listen(&mut self, channel: &str) -> Result<(), SubscribeError>;

    /// Lightweight round-trip proving the connection is still usable.
    async fn keep_alive(&mut self) -> Result<(), SubscribeError>;

    /// Block until the next notification or until `timeout` elapses.
    ///
    /// An elapsed timeout is `Ok(None)`, a normal continuation of the wait loop.
    async fn wait(&mut self, timeout: Duration) -> Result<Option<Notification>, SubscribeError>;

    /// Release the connection. Calling it more than once is a no-op.
    async fn close(&mut self) -> Result<(), SubscribeError>;
}

/// Reject channel names the store could never register.
pub fn validate_channel(channel: &str) -> Result<(), SubscribeError> {
    if channel.trim().is_empty() {
        return Err(SubscribeError::protocol("channel name is empty"));
    }
    if channel.len() > MAX_CHANNEL_LEN {
        return Err(SubscribeError::Protocol(format!(
            "channel name exceeds {MAX_CHANNEL_LEN} bytes"
        )));
    }
    if channel.contains('\0') {
        return Err(SubscribeError::protocol("channel name contains a NUL byte"));
    }
    Ok(())
}
