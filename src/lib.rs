//! pgnotify – a PostgreSQL LISTEN/NOTIFY subscriber that survives connection
//! loss and hands notifications to the caller as a bounded, ordered stream.
//!
//! This crate exports
//!  * `core`    – delivery queue, subscription worker, listener entry point
//!  * `store`   – backing-store seam with PostgreSQL and in-memory backends
//!  * `config`  – TOML + environment runtime configuration
//!  * `logging` – tracing subscriber setup
//!
//! The `pgnotify` binary under `src/bin/` is a thin CLI on top of the library.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;
pub mod store;
pub mod util;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, Config};
pub use core::{listen, listen_with, Listener, Notification, SubscribeError};
