/// End-to-end tests for queue ordering, retry, dedup, and fanout behavior
///
/// Consumers are simulated with the same bounded channels the WebSocket
/// sessions register, so the whole path from `enqueue` to the client handle
/// is exercised without a socket.
use std::time::Duration;

use notify_gateway::config::QueueConfig;
use notify_gateway::models::{EnqueueOptions, NotificationPriority};
use notify_gateway::{ConnectionRegistry, NotificationQueue};
use notify_wire::WireMessage;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn config(base_retry_delay_ms: u64) -> QueueConfig {
    QueueConfig {
        max_queue_size: 100,
        default_max_retries: 5,
        base_retry_delay_ms,
        max_retry_delay_ms: 2_000,
        cleanup_interval_secs: 3600,
        dedup_window_secs: 60,
        client_buffer_size: 16,
    }
}

fn options(priority: NotificationPriority, targets: Option<Vec<&str>>) -> EnqueueOptions {
    EnqueueOptions {
        priority,
        target_clients: targets.map(|t| t.iter().map(|s| s.to_string()).collect()),
        ..Default::default()
    }
}

async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> WireMessage {
    let text = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("channel closed");
    WireMessage::from_json(&text).expect("invalid wire frame")
}

#[tokio::test]
async fn critical_preempts_pending_normal_traffic() {
    let registry = ConnectionRegistry::new();
    let queue = NotificationQueue::new(registry.clone(), config(200));

    // First envelope fails (its target is not connected yet) and parks the
    // worker in its backoff window; everything else is enqueued during that
    // window so the insertion order is fully under test control.
    queue
        .enqueue(
            "first_normal",
            serde_json::json!({"n": 1}),
            options(NotificationPriority::Normal, Some(vec!["sink"])),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    queue
        .enqueue(
            "alarm",
            serde_json::json!({"n": 2}),
            options(NotificationPriority::Critical, Some(vec!["sink"])),
        )
        .await;
    queue
        .enqueue(
            "second_normal",
            serde_json::json!({"n": 3}),
            options(NotificationPriority::Normal, Some(vec!["sink"])),
        )
        .await;

    let (tx, mut rx) = mpsc::channel(16);
    registry.register("sink", tx).await;

    // Critical jumped the queue; equal-priority traffic stays FIFO
    assert_eq!(recv_frame(&mut rx).await.kind, "alarm");
    assert_eq!(recv_frame(&mut rx).await.kind, "first_normal");
    assert_eq!(recv_frame(&mut rx).await.kind, "second_normal");

    queue.destroy().await;
}

#[tokio::test]
async fn retried_critical_requeues_at_tail_behind_low() {
    let registry = ConnectionRegistry::new();
    let queue = NotificationQueue::new(registry.clone(), config(200));

    // A low envelope is pending (its consumer connects shortly) while a
    // critical one keeps failing: after the critical failure the low
    // envelope must be attempted next, not the critical again.
    queue
        .enqueue(
            "low_note",
            serde_json::json!({"n": 1}),
            options(NotificationPriority::Low, Some(vec!["A"])),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let critical_id = queue
        .enqueue(
            "alarm",
            serde_json::json!({"n": 2}),
            EnqueueOptions {
                priority: NotificationPriority::Critical,
                target_clients: Some(vec!["never-connects".to_string()]),
                max_retries: Some(2),
                ..Default::default()
            },
        )
        .await;

    let (tx, mut rx) = mpsc::channel(16);
    registry.register("A", tx).await;

    // The low envelope arrives even though a critical one is mid-retry
    assert_eq!(recv_frame(&mut rx).await.kind, "low_note");

    // And the critical envelope eventually exhausts its budget and drops
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(queue.get(&critical_id).await.is_none());

    let status = queue.status().await;
    assert_eq!(status.depth, 0);
    assert_eq!(status.delivered_total, 1);
    assert_eq!(status.dropped_total, 1);

    queue.destroy().await;
}

#[tokio::test]
async fn duplicate_enqueue_delivers_once() {
    let registry = ConnectionRegistry::new();
    let queue = NotificationQueue::new(registry.clone(), config(50));

    let (tx, mut rx) = mpsc::channel(16);
    registry.register("resident-7", tx).await;

    let payload = serde_json::json!({"visitor": "courier"});
    let first = queue
        .enqueue("visitor_request", payload.clone(), EnqueueOptions::default())
        .await;
    let second = queue
        .enqueue("visitor_request", payload, EnqueueOptions::default())
        .await;

    assert_eq!(first, second);

    assert_eq!(recv_frame(&mut rx).await.kind, "visitor_request");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err(), "duplicate must not be delivered");

    queue.destroy().await;
}

#[tokio::test]
async fn always_failing_envelope_is_attempted_exactly_initial_plus_max_retries() {
    let registry = ConnectionRegistry::new();
    let queue = NotificationQueue::new(registry.clone(), config(20));

    // No consumers at all: every attempt fails
    let id = queue
        .enqueue(
            "unreachable",
            serde_json::json!({}),
            EnqueueOptions {
                max_retries: Some(2),
                ..Default::default()
            },
        )
        .await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    let status = queue.status().await;
    assert_eq!(status.depth, 0);
    assert_eq!(status.delivered_total, 0);
    // initial attempt + 2 retries, then gone
    assert_eq!(status.retried_total, 2);
    assert_eq!(status.dropped_total, 1);
    assert!(queue.get(&id).await.is_none());

    queue.destroy().await;
}

#[tokio::test]
async fn envelope_expired_at_enqueue_is_never_attempted() {
    let registry = ConnectionRegistry::new();
    let queue = NotificationQueue::new(registry.clone(), config(20));

    let (tx, mut rx) = mpsc::channel(16);
    registry.register("guard-desk", tx).await;

    queue
        .enqueue(
            "stale_alert",
            serde_json::json!({}),
            EnqueueOptions {
                expires_at: Some(chrono::Utc::now() - chrono::Duration::seconds(10)),
                ..Default::default()
            },
        )
        .await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(rx.try_recv().is_err(), "expired envelope must not be sent");
    let status = queue.status().await;
    assert_eq!(status.depth, 0);
    assert_eq!(status.delivered_total, 0);
    assert_eq!(status.dropped_total, 1);

    queue.destroy().await;
}

#[tokio::test]
async fn full_queue_without_low_priority_rejects_new_work() {
    let registry = ConnectionRegistry::new();
    let mut cfg = config(500);
    cfg.max_queue_size = 3;
    let queue = NotificationQueue::new(registry.clone(), cfg);

    // All pending envelopes target a consumer that never connects, so they
    // sit in the backoff window while capacity is probed
    for i in 0..3 {
        queue
            .enqueue(
                format!("pending_{i}"),
                serde_json::json!({ "i": i }),
                options(NotificationPriority::Normal, Some(vec!["offline"])),
            )
            .await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rejected = queue
        .enqueue(
            "overflow",
            serde_json::json!({}),
            options(NotificationPriority::High, Some(vec!["offline"])),
        )
        .await;

    assert!(queue.get(&rejected).await.is_none());
    let status = queue.status().await;
    assert_eq!(status.depth, 3);
    assert_eq!(status.dropped_total, 1);

    queue.destroy().await;
}

#[tokio::test]
async fn targeted_delivery_never_leaks_to_other_clients() {
    let registry = ConnectionRegistry::new();
    let queue = NotificationQueue::new(registry.clone(), config(50));

    let (tx_a, mut rx_a) = mpsc::channel(16);
    let (tx_c, mut rx_c) = mpsc::channel(16);
    registry.register("A", tx_a).await;
    registry.register("C", tx_c).await;

    // Target A and B while only A is connected: one success is enough,
    // nothing is retried, and C never sees the message
    queue
        .enqueue(
            "escort_request",
            serde_json::json!({"gate": "east"}),
            options(NotificationPriority::Normal, Some(vec!["A", "B"])),
        )
        .await;

    assert_eq!(recv_frame(&mut rx_a).await.kind, "escort_request");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx_c.try_recv().is_err());

    let status = queue.status().await;
    assert_eq!(status.delivered_total, 1);
    assert_eq!(status.retried_total, 0);

    queue.destroy().await;
}

#[tokio::test]
async fn message_enqueued_before_any_consumer_waits_for_one() {
    let registry = ConnectionRegistry::new();
    let queue = NotificationQueue::new(registry.clone(), config(100));

    queue
        .enqueue("early_bird", serde_json::json!({}), EnqueueOptions::default())
        .await;

    // Let a couple of broadcast attempts fail first
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(queue.status().await.depth, 1);

    let (tx, mut rx) = mpsc::channel(16);
    registry.register("late-joiner", tx).await;

    assert_eq!(recv_frame(&mut rx).await.kind, "early_bird");
    assert_eq!(queue.status().await.delivered_total, 1);

    queue.destroy().await;
}
