#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use pgnotify::core::{SubscriptionOptions, SubscriptionState, WorkerHandle};

pub const RETRY_DELAY: Duration = Duration::from_secs(10);
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        pgnotify::logging::init_logging();
    });
}

pub fn options(queue_capacity: usize) -> SubscriptionOptions {
    SubscriptionOptions {
        retry_delay: RETRY_DELAY,
        wait_timeout: WAIT_TIMEOUT,
        queue_capacity,
        ..SubscriptionOptions::default()
    }
}

/// Wait until the worker is listening on its `attempt`-th connection.
pub async fn wait_listening(worker: &WorkerHandle, attempt: u64) {
    let mut states = worker.state_changes();
    states
        .wait_for(|s| *s == SubscriptionState::Listening && worker.stats().attempts() >= attempt)
        .await
        .expect("worker exited before listening");
}

pub async fn wait_state(worker: &WorkerHandle, state: SubscriptionState) {
    let mut states = worker.state_changes();
    states
        .wait_for(|s| *s == state)
        .await
        .expect("worker exited before reaching state");
}
