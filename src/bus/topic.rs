//! A topic: ingress queue, replay buffer, subscriber set, and the single
//! delivery worker that drains one into the other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::core::config::{BusConfig, FullQueuePolicy};

use super::error::BusError;
use super::message::Message;
use super::metrics::MetricsRegistry;
use super::ring_buffer::RingBuffer;
use super::subscriber::Subscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicState {
    Active,
    Draining,
    Closed,
}

/// Bounded ingress queue between publishers and the delivery worker. A
/// `Mutex<VecDeque>` rather than `tokio::mpsc` because `EvictOldest` needs to
/// pop the front on a full queue, which a channel cannot do.
struct IngressQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Arc<Message>>>,
    notify: Notify,
}

impl IngressQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            notify: Notify::new(),
        }
    }

    /// Returns `Ok(true)` if an older message was evicted to make room.
    fn try_push(&self, msg: Arc<Message>, policy: FullQueuePolicy) -> Result<bool, BusError> {
        let mut guard = self.inner.lock();
        let evicted = if guard.len() >= self.capacity {
            match policy {
                FullQueuePolicy::RejectNewest => return Err(BusError::QueueFull),
                FullQueuePolicy::EvictOldest => {
                    guard.pop_front();
                    true
                }
            }
        } else {
            false
        };
        guard.push_back(msg);
        drop(guard);
        self.notify.notify_one();
        Ok(evicted)
    }

    async fn pop_timeout(&self, timeout: Duration) -> Option<Arc<Message>> {
        if let Some(msg) = self.inner.lock().pop_front() {
            return Some(msg);
        }
        let notified = self.notify.notified();
        tokio::time::timeout(timeout, notified).await.ok()?;
        self.inner.lock().pop_front()
    }

    fn drain(&self) -> Vec<Arc<Message>> {
        self.inner.lock().drain(..).collect()
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

struct TopicGuarded {
    state: TopicState,
    subscribers: HashMap<String, Arc<Subscriber>>,
    /// Sequence number the next published message will receive. Advanced
    /// only under this lock, the same lock `subscribe` reads to set a new
    /// subscriber's join high-water mark, which keeps a message enqueued
    /// before a subscriber joined from ever reaching it as "live".
    next_seq: u64,
}

#[derive(Debug, Clone)]
pub struct TopicStats {
    pub name: String,
    pub state: TopicState,
    pub queue_depth: usize,
    pub ring_len: usize,
    pub subscriber_count: usize,
}

/// Owns its subscriber set, replay buffer, bounded ingress queue, and single
/// delivery worker.
pub struct Topic {
    pub name: String,
    ring: RingBuffer,
    ingress: IngressQueue,
    guarded: Mutex<TopicGuarded>,
    full_queue_policy: FullQueuePolicy,
    batch_size: usize,
    batch_timeout: Duration,
    max_payload_bytes: usize,
    metrics: Arc<MetricsRegistry>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Topic {
    pub fn spawn(name: String, config: Arc<BusConfig>, metrics: Arc<MetricsRegistry>) -> Arc<Self> {
        let topic = Arc::new(Self {
            name,
            ring: RingBuffer::new(config.ring_capacity),
            ingress: IngressQueue::new(config.ingress_queue_capacity),
            guarded: Mutex::new(TopicGuarded {
                state: TopicState::Active,
                subscribers: HashMap::new(),
                next_seq: 0,
            }),
            full_queue_policy: config.full_queue_policy,
            batch_size: config.batch_size,
            batch_timeout: config.batch_timeout,
            max_payload_bytes: config.max_payload_bytes,
            metrics,
            worker_handle: Mutex::new(None),
        });

        let worker_topic = topic.clone();
        let handle = tokio::spawn(async move { Topic::run_worker(worker_topic).await });
        *topic.worker_handle.lock() = Some(handle);
        topic
    }

    pub fn state(&self) -> TopicState {
        self.guarded.lock().state
    }

    /// Under the topic lock: reject if not Active, assign the next sequence
    /// number, append to the ring, attempt non-blocking enqueue per the
    /// full-queue policy, release. Never awaits a subscriber's send — O(1)
    /// wall-clock. Sequence assignment shares the lock with `subscribe` so a
    /// message already assigned a seq here is never mistaken by a
    /// concurrently-joining subscriber for one published after it joined.
    pub fn publish(&self, payload: Value) -> Result<Arc<Message>, BusError> {
        let mut guard = self.guarded.lock();
        match guard.state {
            TopicState::Active => {}
            TopicState::Draining | TopicState::Closed => return Err(BusError::ShuttingDown),
        }

        let seq = guard.next_seq;
        let msg = Arc::new(Message::new(self.name.clone(), payload, self.max_payload_bytes, seq)?);
        guard.next_seq += 1;

        self.ring.append(msg.clone());
        let push_result = self.ingress.try_push(msg.clone(), self.full_queue_policy);
        drop(guard);

        self.metrics.record_published(&self.name);
        match push_result {
            Ok(evicted) => {
                if evicted {
                    self.metrics.record_dropped(&self.name);
                }
                self.metrics.set_queue_depth(&self.name, self.ingress.len() as u64);
                Ok(msg)
            }
            Err(e) => {
                self.metrics.record_dropped(&self.name);
                Err(e)
            }
        }
    }

    /// Obtains replay and the current join high-water mark under the topic
    /// lock, adds the subscriber to the map, releases the lock, then returns
    /// the replay batch for the caller to send outside the lock. Recording
    /// `join_seq` before the insert, under the same lock `publish` advances
    /// `next_seq` under, guarantees this subscriber's first live delivery is
    /// a message published no earlier than this call, so replay strictly
    /// precedes live and nothing already queued before join leaks through as
    /// "live".
    pub fn subscribe(
        &self,
        sub: Arc<Subscriber>,
        last_n: usize,
    ) -> Result<Vec<Arc<Message>>, BusError> {
        let replay = {
            let mut guard = self.guarded.lock();
            if guard.state != TopicState::Active {
                return Err(BusError::ShuttingDown);
            }
            let replay = self.ring.tail(last_n);
            sub.set_join_seq(guard.next_seq);
            guard.subscribers.insert(sub.client_id.clone(), sub.clone());
            self.metrics
                .set_subscriber_count(&self.name, guard.subscribers.len() as u64);
            replay
        };
        sub.joined(&self.name);
        Ok(replay)
    }

    /// Idempotent: removing an absent subscriber is a no-op.
    pub fn unsubscribe(&self, client_id: &str) {
        let mut guard = self.guarded.lock();
        let removed = guard.subscribers.remove(client_id);
        self.metrics
            .set_subscriber_count(&self.name, guard.subscribers.len() as u64);
        drop(guard);
        if let Some(sub) = removed {
            sub.left(&self.name);
        }
    }

    pub fn snapshot_subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.guarded.lock().subscribers.values().cloned().collect()
    }

    pub fn stats(&self) -> TopicStats {
        let guard = self.guarded.lock();
        TopicStats {
            name: self.name.clone(),
            state: guard.state,
            queue_depth: self.ingress.len(),
            ring_len: self.ring.len(),
            subscriber_count: guard.subscribers.len(),
        }
    }

    /// Transitions to Draining and awaits the worker's final drain-and-flush,
    /// bounded by `deadline`. Used by both `TopicManager::delete` and
    /// `TopicManager::shutdown_all`.
    pub async fn shutdown(&self, deadline: Duration) {
        {
            let mut guard = self.guarded.lock();
            if guard.state == TopicState::Active {
                guard.state = TopicState::Draining;
            }
        }
        self.ingress.notify.notify_one();

        let handle = self.worker_handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(deadline, handle).await.is_err() {
                tracing::warn!(topic = %self.name, "worker did not exit within shutdown deadline");
            }
        }

        let subs = std::mem::take(&mut self.guarded.lock().subscribers);
        let reason = format!("topic {} is closing", self.name);
        futures::future::join_all(subs.values().map(|sub| sub.notify_closed(&reason))).await;

        self.guarded.lock().state = TopicState::Closed;
    }

    async fn flush(&self, batch: &[Arc<Message>]) {
        if batch.is_empty() {
            return;
        }
        let send_start = Instant::now();
        for msg in batch {
            self.metrics
                .record_latency(&self.name, send_start.saturating_duration_since(msg.published_at));
        }

        let subs = self.snapshot_subscribers();
        let sends = subs.iter().map(|sub| {
            let sub = sub.clone();
            // Messages enqueued before this subscriber joined never reach it
            // as a live delivery, even if the worker only drains them after
            // the join. See `Topic::subscribe`.
            let join_seq = sub.join_seq();
            let due: Vec<Arc<Message>> = batch.iter().filter(|m| m.seq >= join_seq).cloned().collect();
            async move {
                let count = due.len() as u64;
                let ok = sub.send_batch(&due).await;
                (sub.client_id.clone(), ok, count)
            }
        });
        let results = futures::future::join_all(sends).await;

        let mut delivered: u64 = 0;
        for (client_id, ok, count) in results {
            if ok {
                delivered += count;
            } else {
                self.unsubscribe(&client_id);
            }
        }
        if delivered > 0 {
            self.metrics.record_delivered(&self.name, delivered);
        }
        self.metrics.set_queue_depth(&self.name, self.ingress.len() as u64);
    }

    async fn run_worker(topic: Arc<Topic>) {
        let mut batch: Vec<Arc<Message>> = Vec::new();
        let mut deadline_at = Instant::now() + topic.batch_timeout;

        loop {
            if topic.state() == TopicState::Draining {
                let mut remaining = topic.ingress.drain();
                batch.append(&mut remaining);
                topic.flush(&batch).await;
                break;
            }

            let now = Instant::now();
            let wait = deadline_at
                .saturating_duration_since(now)
                .max(Duration::from_millis(1));

            match topic.ingress.pop_timeout(wait).await {
                Some(msg) => {
                    batch.push(msg);
                    if batch.len() >= topic.batch_size {
                        topic.flush(&batch).await;
                        batch.clear();
                        deadline_at = Instant::now() + topic.batch_timeout;
                    }
                }
                None => {
                    if !batch.is_empty() {
                        topic.flush(&batch).await;
                        batch.clear();
                    }
                    deadline_at = Instant::now() + topic.batch_timeout;
                }
            }
        }
    }
}
