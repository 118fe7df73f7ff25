mod common;

use std::time::Duration;

use pgnotify::core::OverflowPolicy;
use pgnotify::listen_with;
use pgnotify::store::MemoryStore;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn full_queue_blocks_the_worker_instead_of_dropping() {
    common::init_logging();
    let store = MemoryStore::new();
    let listener = listen_with(store.clone(), "burst", common::options(2), CancellationToken::new());
    common::wait_listening(listener.worker(), 1).await;

    for p in ["one", "two", "three"] {
        store.notify("burst", p);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Two fit; the worker is parked on the third.
    assert_eq!(listener.queued(), 2);
    assert_eq!(listener.worker().stats().delivered(), 2);

    assert_eq!(listener.recv().await.unwrap().payload(), "one");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(listener.worker().stats().delivered(), 3);

    assert_eq!(listener.recv().await.unwrap().payload(), "two");
    assert_eq!(listener.recv().await.unwrap().payload(), "three");
    assert_eq!(listener.worker().stats().dropped(), 0);

    listener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn drop_oldest_keeps_the_newest_notifications() {
    common::init_logging();
    let store = MemoryStore::new();
    let mut options = common::options(2);
    options.overflow_policy = OverflowPolicy::DropOldest;
    let listener = listen_with(store.clone(), "burst", options, CancellationToken::new());
    common::wait_listening(listener.worker(), 1).await;

    for p in ["one", "two", "three", "four"] {
        store.notify("burst", p);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(listener.worker().stats().dropped(), 2);
    assert_eq!(listener.recv().await.unwrap().payload(), "three");
    assert_eq!(listener.recv().await.unwrap().payload(), "four");

    listener.shutdown().await.unwrap();
}
