mod common;

use futures::StreamExt;
use pgnotify::listen_with;
use pgnotify::store::MemoryStore;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn delivers_payloads_in_push_order() {
    common::init_logging();
    let store = MemoryStore::new();
    let listener = listen_with(store.clone(), "orders", common::options(10), CancellationToken::new());
    common::wait_listening(listener.worker(), 1).await;

    // More payloads than the queue holds, so the worker blocks along the way.
    let payloads: Vec<String> = (0..25).map(|i| format!("msg-{i}")).collect();
    for p in &payloads {
        assert_eq!(store.notify("orders", p.as_str()), 1);
    }

    let received: Vec<String> = listener
        .stream()
        .take(payloads.len())
        .map(|n| n.into_payload())
        .collect()
        .await;
    assert_eq!(received, payloads);
    assert_eq!(listener.worker().stats().delivered(), 25);
    assert_eq!(listener.worker().stats().attempts(), 1);

    listener.shutdown().await.unwrap();
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn ignores_other_channels() {
    common::init_logging();
    let store = MemoryStore::new();
    let listener = listen_with(store.clone(), "orders", common::options(10), CancellationToken::new());
    common::wait_listening(listener.worker(), 1).await;

    assert_eq!(store.notify("invoices", "nope"), 0);
    store.notify("orders", "yes");

    let n = listener.recv().await.unwrap();
    assert_eq!(n.payload(), "yes");
    assert_eq!(n.channel(), "orders");
    assert_eq!(listener.queued(), 0);

    listener.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn quiet_channel_keeps_polling_without_reconnecting() {
    common::init_logging();
    let store = MemoryStore::new();
    let listener = listen_with(store.clone(), "quiet", common::options(10), CancellationToken::new());
    common::wait_listening(listener.worker(), 1).await;

    // Several wait timeouts pass without traffic.
    tokio::time::sleep(common::WAIT_TIMEOUT * 4).await;
    assert_eq!(listener.worker().stats().attempts(), 1);
    assert_eq!(store.connect_attempts(), 1);

    store.notify("quiet", "finally");
    assert_eq!(listener.recv().await.unwrap().payload(), "finally");
    listener.shutdown().await.unwrap();
}
