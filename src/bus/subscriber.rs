//! Per-connection subscriber handle: deadline-bound batch delivery and a
//! per-subscriber rate limiter.
//!
//! A Subscriber does not own a message queue. Batches are handed to it
//! synchronously by the topic worker, with `send_deadline` bounding how long
//! that hand-off may block.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::message::Message;

/// Abstracts "deliver this batch to the remote end" away from any concrete
/// transport. The dispatcher wires a real connection's send half in here;
/// tests use an in-memory collector.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn send_batch(&self, batch: &[Arc<Message>]) -> bool;

    /// Best-effort out-of-band notice that the topic is going away (deleted
    /// or draining on shutdown), sent once before the subscriber is dropped
    /// from the topic. Ignored by sinks with nothing to notify.
    async fn notify_closed(&self, _reason: &str) {}
}

/// Token bucket with continuous refill and all-or-nothing reservation.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<TokenBucketState>,
}

struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate: u32, burst: u32) -> Self {
        Self {
            rate: rate.max(1) as f64,
            burst: burst as f64,
            state: Mutex::new(TokenBucketState {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// `true` if a single request is admitted now; on denial returns the
    /// number of whole seconds until at least one token is available.
    pub fn check(&self, now: Instant) -> Result<(), u64> {
        let mut state = self.state.lock();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            let wait_secs = (deficit / self.rate).ceil() as u64;
            Err(wait_secs.max(1))
        }
    }
}

/// One remote connection's subscription state.
pub struct Subscriber {
    pub client_id: String,
    sink: Arc<dyn BatchSink>,
    closed: AtomicBool,
    send_deadline: Duration,
    rate_limiter: TokenBucket,
    topics: Mutex<std::collections::HashSet<String>>,
    /// Publish sequence number at the moment this subscriber joined a topic;
    /// set by `Topic::subscribe` before the subscriber becomes visible to the
    /// delivery worker. A message is live-delivered to this subscriber only
    /// if its own `seq >= join_seq`.
    join_seq: std::sync::atomic::AtomicU64,
}

impl Subscriber {
    pub fn new(
        client_id: String,
        sink: Arc<dyn BatchSink>,
        send_deadline: Duration,
        rate_rps: u32,
        rate_burst: u32,
    ) -> Self {
        Self {
            client_id,
            sink,
            closed: AtomicBool::new(false),
            send_deadline,
            rate_limiter: TokenBucket::new(rate_rps, rate_burst),
            topics: Mutex::new(std::collections::HashSet::new()),
            join_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Records the topic's next-to-assign publish sequence number at join
    /// time. Called once, by `Topic::subscribe`, before this subscriber is
    /// inserted into the topic's subscriber map.
    pub fn set_join_seq(&self, seq: u64) {
        self.join_seq.store(seq, Ordering::SeqCst);
    }

    pub fn join_seq(&self) -> u64 {
        self.join_seq.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn joined(&self, topic: &str) {
        self.topics.lock().insert(topic.to_string());
    }

    pub fn left(&self, topic: &str) {
        self.topics.lock().remove(topic);
    }

    /// Topic names this subscriber currently belongs to, for disconnect
    /// cleanup: `TopicManager.get(name).unsubscribe(client_id)` per name.
    pub fn joined_topics(&self) -> Vec<String> {
        self.topics.lock().iter().cloned().collect()
    }

    /// Enforce the per-subscriber publish-path token bucket.
    pub fn check_rate(&self, now: Instant) -> Result<(), u64> {
        self.rate_limiter.check(now)
    }

    /// Notify the remote end why it is being dropped from a topic, then
    /// close locally. Best-effort: a failed notify still closes.
    pub async fn notify_closed(&self, reason: &str) {
        self.sink.notify_closed(reason).await;
        self.close();
    }

    /// Deliver a batch under the send deadline. On timeout or transport
    /// failure, marks the subscriber closed and returns `false`.
    pub async fn send_batch(&self, batch: &[Arc<Message>]) -> bool {
        if self.is_closed() || batch.is_empty() {
            return !self.is_closed();
        }
        match tokio::time::timeout(self.send_deadline, self.sink.send_batch(batch)).await {
            Ok(true) => true,
            Ok(false) => {
                self.close();
                false
            }
            Err(_) => {
                self.close();
                false
            }
        }
    }
}

/// In-memory `BatchSink` test double, available to integration tests as well
/// as this module's own unit tests.
pub mod test_util {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;

    /// In-memory sink recording every batch it receives; optionally stalls
    /// each send to simulate a slow consumer.
    pub struct CollectingSink {
        pub received: AsyncMutex<Vec<Arc<Message>>>,
        pub closed_reasons: AsyncMutex<Vec<String>>,
        pub delay: Duration,
        pub fail: AtomicBool,
    }

    impl CollectingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                received: AsyncMutex::new(Vec::new()),
                closed_reasons: AsyncMutex::new(Vec::new()),
                delay: Duration::ZERO,
                fail: AtomicBool::new(false),
            })
        }

        pub fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                received: AsyncMutex::new(Vec::new()),
                closed_reasons: AsyncMutex::new(Vec::new()),
                delay,
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl BatchSink for CollectingSink {
        async fn send_batch(&self, batch: &[Arc<Message>]) -> bool {
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return false;
            }
            self.received.lock().await.extend_from_slice(batch);
            true
        }

        async fn notify_closed(&self, reason: &str) {
            self.closed_reasons.lock().await.push(reason.to_string());
        }
    }
}
