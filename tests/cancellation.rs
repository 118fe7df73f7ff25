mod common;

use std::time::Duration;

use futures::StreamExt;
use pgnotify::core::SubscriptionState;
use pgnotify::listen_with;
use pgnotify::store::MemoryStore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn cancel_while_waiting_ends_stream_and_closes_connection() {
    common::init_logging();
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    let listener = listen_with(store.clone(), "jobs", common::options(10), cancel.clone());
    common::wait_listening(listener.worker(), 1).await;

    let consumer = {
        let stream = listener.stream();
        tokio::spawn(async move { stream.collect::<Vec<_>>().await })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();

    let seen = timeout(common::WAIT_TIMEOUT, consumer).await.unwrap().unwrap();
    assert!(seen.is_empty());

    let mut states = listener.worker().state_changes();
    timeout(
        common::WAIT_TIMEOUT,
        states.wait_for(|s| *s == SubscriptionState::Stopped),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(listener.recv().await.is_none());
    assert_eq!(store.open_connections(), 0);

    listener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancel_during_retry_delay_skips_the_next_attempt() {
    common::init_logging();
    let store = MemoryStore::new();
    store.set_reachable(false);
    let cancel = CancellationToken::new();
    let listener = listen_with(store.clone(), "jobs", common::options(10), cancel.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(listener.worker().stats().attempts(), 1);
    assert_eq!(listener.worker().state(), SubscriptionState::Disconnected);

    cancel.cancel();
    timeout(Duration::from_secs(1), listener.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_connect_leaves_nothing_open() {
    common::init_logging();
    let store = MemoryStore::new();
    store.set_connect_latency(Duration::from_secs(60));
    let listener = listen_with(store.clone(), "jobs", common::options(10), CancellationToken::new());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(listener.worker().state(), SubscriptionState::Connecting);

    timeout(Duration::from_secs(1), listener.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_while_blocked_on_full_queue() {
    common::init_logging();
    let store = MemoryStore::new();
    let listener = listen_with(store.clone(), "jobs", common::options(1), CancellationToken::new());
    common::wait_listening(listener.worker(), 1).await;

    for p in ["a", "b", "c"] {
        store.notify("jobs", p);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(listener.worker().stats().delivered(), 1);
    assert!(!listener.worker().is_finished());

    timeout(Duration::from_secs(1), listener.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store.open_connections(), 0);
}
