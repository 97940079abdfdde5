//! Literal end-to-end scenarios.
//!
//! S1, S2, S6 and S4b drive the dispatcher over a `MockConnection`; S3 and
//! S5 exercise `Topic` directly so delivery timing can be observed without a
//! transport in the loop; S4 exercises `TokenBucket` directly so its
//! admission counts are pinned to caller-chosen instants instead of
//! depending on real wall-clock scheduling.

use std::sync::Arc;
use std::time::Duration;

use topicbus::bus::dispatcher::Dispatcher;
use topicbus::bus::schema::{ClientMessage, ServerMessage};
use topicbus::bus::subscriber::Subscriber;
use topicbus::bus::subscriber::TokenBucket;
use topicbus::bus::subscriber::test_util::CollectingSink;
use topicbus::bus::topic::Topic;
use topicbus::bus::topic_manager::TopicManager;
use topicbus::bus::transport::mock::MockConnection;
use topicbus::core::config::BusConfig;

fn manager_with(overrides: impl FnOnce(&mut BusConfig)) -> Arc<TopicManager> {
    let mut config = BusConfig::default();
    config.batch_timeout = Duration::from_millis(10);
    overrides(&mut config);
    Arc::new(TopicManager::new(config))
}

async fn run_connection(
    manager: &Arc<TopicManager>,
    client_id: &str,
    frames: Vec<ClientMessage>,
) -> Vec<ServerMessage> {
    let dispatcher = Dispatcher::new(manager.clone());
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let conn = MockConnection::new(frames);
    let outbox = conn.outbox_handle();
    dispatcher.run(Box::new(conn), client_id.to_string(), rx).await;
    MockConnection::take_outbox(&outbox).await
}

fn events_with_field(frames: &[ServerMessage], field: &str) -> Vec<i64> {
    frames
        .iter()
        .filter_map(|f| match f {
            ServerMessage::Event { data, .. } => data.get(field).and_then(|v| v.as_i64()),
            _ => None,
        })
        .collect()
}

/// S1. Replay-then-live order.
#[tokio::test]
async fn s1_replay_then_live_order() {
    let manager = manager_with(|_| {});
    let (topic, _) = manager.create("t").unwrap();
    for i in 1..=5 {
        topic.publish(serde_json::json!({ "i": i })).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let frames = run_connection(
        &manager,
        "a",
        vec![
            ClientMessage::Subscribe {
                topic: "t".into(),
                last_n: 3,
            },
            ClientMessage::Ping,
        ],
    )
    .await;

    // Publish happened before subscribe returned, so only replay is visible
    // in this short-lived connection; the ordering property is what matters.
    let values = events_with_field(&frames, "i");
    assert_eq!(values, vec![3, 4, 5]);
}

/// S2. Per-topic FIFO with fan-out.
#[tokio::test]
async fn s2_fifo_fan_out_to_two_subscribers() {
    let manager = manager_with(|c| c.batch_size = 1000);
    let (topic, _) = manager.create("t").unwrap();

    let sink_a = CollectingSink::new();
    let sink_b = CollectingSink::new();
    let sub_a = Arc::new(Subscriber::new(
        "a".into(),
        sink_a.clone(),
        Duration::from_millis(500),
        1000,
        500,
    ));
    let sub_b = Arc::new(Subscriber::new(
        "b".into(),
        sink_b.clone(),
        Duration::from_millis(500),
        1000,
        500,
    ));
    topic.subscribe(sub_a, 0).unwrap();
    topic.subscribe(sub_b, 0).unwrap();

    for n in 1..=100 {
        topic.publish(serde_json::json!({ "n": n })).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let expected: Vec<i64> = (1..=100).collect();
    let a: Vec<i64> = sink_a
        .received
        .lock()
        .await
        .iter()
        .map(|m| m.payload["n"].as_i64().unwrap())
        .collect();
    let b: Vec<i64> = sink_b
        .received
        .lock()
        .await
        .iter()
        .map(|m| m.payload["n"].as_i64().unwrap())
        .collect();
    assert_eq!(a, expected);
    assert_eq!(b, expected);
}

/// S3. Slow subscriber removal. A accepts frames with 2s latency; B
/// immediately. A must be closed and removed within the send deadline, B
/// receives everything in order.
#[tokio::test(start_paused = true)]
async fn s3_slow_subscriber_is_closed_and_removed() {
    let manager = manager_with(|c| {
        c.batch_size = 50;
        c.send_deadline = Duration::from_millis(500);
    });
    let (topic, _) = manager.create("t").unwrap();

    let slow_sink = CollectingSink::with_delay(Duration::from_secs(2));
    let fast_sink = CollectingSink::new();
    let slow = Arc::new(Subscriber::new(
        "slow".into(),
        slow_sink,
        Duration::from_millis(500),
        1000,
        500,
    ));
    let fast = Arc::new(Subscriber::new(
        "fast".into(),
        fast_sink.clone(),
        Duration::from_millis(500),
        1000,
        500,
    ));
    topic.subscribe(slow, 0).unwrap();
    topic.subscribe(fast, 0).unwrap();

    for i in 1..=50 {
        topic.publish(serde_json::json!({ "i": i })).unwrap();
    }

    tokio::time::advance(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;

    assert_eq!(topic.stats().subscriber_count, 1);
    let fast_values: Vec<i64> = fast_sink
        .received
        .lock()
        .await
        .iter()
        .map(|m| m.payload["i"].as_i64().unwrap())
        .collect();
    assert_eq!(fast_values, (1..=50).collect::<Vec<_>>());
}

/// S4. Rate limit: R=10, B=5, 20 back-to-back publishes → 15 admitted, 5
/// denied with a positive retry-after.
///
/// `check_rate` is driven by caller-supplied `Instant`s rather than the
/// dispatcher's own `Instant::now()` precisely so this can be pinned down
/// deterministically: the first 10 checks land on the same instant (the
/// burst of 5 drains it, the next 5 find it empty), then 10 more checks
/// land 100ms apart, each refilling exactly the one token rate*0.1s=1.0
/// supplies before it's immediately spent.
#[test]
fn s4_rate_limit_admits_burst_then_steady_rate() {
    let bucket = TokenBucket::new(10, 5);
    let t0 = std::time::Instant::now();

    let mut admitted = 0u32;
    let mut denied: Vec<u64> = Vec::new();
    for _ in 0..10 {
        match bucket.check(t0) {
            Ok(()) => admitted += 1,
            Err(secs) => denied.push(secs),
        }
    }
    for step in 1..=10u32 {
        let now = t0 + Duration::from_millis(100 * step as u64);
        match bucket.check(now) {
            Ok(()) => admitted += 1,
            Err(secs) => denied.push(secs),
        }
    }

    assert_eq!(admitted, 15);
    assert_eq!(denied.len(), 5);
    assert!(denied.iter().all(|&secs| secs > 0));
}

/// S4b. The same ceiling enforced through the dispatcher: once a
/// subscriber's bucket is exhausted, a publish is answered with a
/// RATE_LIMITED error frame instead of an ack.
#[tokio::test]
async fn s4b_dispatcher_surfaces_rate_limited_error() {
    let manager = manager_with(|c| {
        c.rate_limit_rps = 1;
        c.rate_limit_burst = 1;
    });
    manager.create("t").unwrap();

    let frames = vec![
        ClientMessage::Publish {
            topic: "t".into(),
            data: serde_json::json!({ "i": 1 }),
        },
        ClientMessage::Publish {
            topic: "t".into(),
            data: serde_json::json!({ "i": 2 }),
        },
    ];
    let outbox = run_connection(&manager, "c1", frames).await;

    let acked = outbox
        .iter()
        .filter(|f| matches!(f, ServerMessage::Ack { request_type, .. } if request_type == "publish"))
        .count();
    let rate_limited = outbox
        .iter()
        .filter(|f| matches!(f, ServerMessage::Error { code, .. } if code == "RATE_LIMITED"))
        .count();
    assert_eq!(acked, 1);
    assert_eq!(rate_limited, 1);
}

/// S5. Graceful shutdown flush: every enqueued message is either fully
/// delivered or a clean prefix of delivery, never a gap.
#[tokio::test]
async fn s5_shutdown_flushes_a_clean_prefix() {
    let manager = manager_with(|c| {
        c.batch_size = 1000;
        c.batch_timeout = Duration::from_secs(60);
    });
    let (topic, _) = manager.create("t").unwrap();

    let sink = CollectingSink::new();
    let sub = Arc::new(Subscriber::new(
        "a".into(),
        sink.clone(),
        Duration::from_millis(500),
        1000,
        500,
    ));
    topic.subscribe(sub, 0).unwrap();

    for i in 1..=20 {
        topic.publish(serde_json::json!({ "i": i })).unwrap();
    }
    manager.shutdown_all(Duration::from_secs(5)).await;

    let received: Vec<i64> = sink
        .received
        .lock()
        .await
        .iter()
        .map(|m| m.payload["i"].as_i64().unwrap())
        .collect();
    assert_eq!(received, (1..=received.len() as i64).collect::<Vec<_>>());
}

/// S6. Topic deletion with active subscribers; re-create starts fresh.
#[tokio::test]
async fn s6_delete_with_active_subscribers_then_recreate() {
    let manager = manager_with(|_| {});
    let (topic, _) = manager.create("t").unwrap();

    let sink_a = CollectingSink::new();
    let sink_b = CollectingSink::new();
    let sub_a = Arc::new(Subscriber::new(
        "a".into(),
        sink_a.clone(),
        Duration::from_millis(500),
        1000,
        500,
    ));
    let sub_b = Arc::new(Subscriber::new(
        "b".into(),
        sink_b.clone(),
        Duration::from_millis(500),
        1000,
        500,
    ));
    topic.subscribe(sub_a, 0).unwrap();
    topic.subscribe(sub_b, 0).unwrap();

    manager.delete("t").await.unwrap();
    assert!(manager.get("t").is_none());
    assert_eq!(sink_a.closed_reasons.lock().await.len(), 1);
    assert_eq!(sink_b.closed_reasons.lock().await.len(), 1);

    let err = topic.publish(serde_json::json!({})).unwrap_err();
    assert_eq!(err.code(), "SHUTTING_DOWN");

    let (topic2, created) = manager.create("t").unwrap();
    assert!(created);
    assert_eq!(topic2.stats().ring_len, 0);
    assert_eq!(topic2.stats().subscriber_count, 0);
}
