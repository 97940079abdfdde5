//! Per-topic and global counters, gauges, and a latency histogram.
//!
//! Snapshot production never touches the delivery path's locks: each counter
//! is an independent atomic, and the snapshot walk takes a read lock on the
//! topic-name map only long enough to clone it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

const LATENCY_RESERVOIR_CAPACITY: usize = 256;

#[derive(Default)]
struct TopicCounters {
    messages_published: AtomicU64,
    messages_delivered: AtomicU64,
    messages_dropped: AtomicU64,
    queue_depth: AtomicU64,
    subscriber_count: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
}

impl TopicCounters {
    fn record_latency(&self, ms: u64) {
        let mut guard = self.latencies_ms.lock();
        if guard.len() >= LATENCY_RESERVOIR_CAPACITY {
            guard.pop_front();
        }
        guard.push_back(ms);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicMetricsSnapshot {
    pub topic: String,
    pub messages_published: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub queue_depth: u64,
    pub subscriber_count: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub topics: Vec<TopicMetricsSnapshot>,
    pub total_messages_published: u64,
    pub total_messages_delivered: u64,
    pub total_messages_dropped: u64,
}

/// Per-topic counters, gauges, and a latency histogram. Safe to share across
/// every topic and the control-plane collaborator.
pub struct MetricsRegistry {
    topics: RwLock<HashMap<String, Arc<TopicCounters>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    fn counters_for(&self, topic: &str) -> Arc<TopicCounters> {
        if let Some(c) = self.topics.read().get(topic) {
            return c.clone();
        }
        self.topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(TopicCounters::default()))
            .clone()
    }

    pub fn record_published(&self, topic: &str) {
        self.counters_for(topic)
            .messages_published
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, topic: &str, count: u64) {
        self.counters_for(topic)
            .messages_delivered
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, topic: &str) {
        self.counters_for(topic)
            .messages_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, topic: &str, depth: u64) {
        self.counters_for(topic)
            .queue_depth
            .store(depth, Ordering::Relaxed);
    }

    pub fn set_subscriber_count(&self, topic: &str, count: u64) {
        self.counters_for(topic)
            .subscriber_count
            .store(count, Ordering::Relaxed);
    }

    pub fn record_latency(&self, topic: &str, latency: Duration) {
        self.counters_for(topic)
            .record_latency(latency.as_millis() as u64);
    }

    pub fn remove_topic(&self, topic: &str) {
        self.topics.write().remove(topic);
    }

    /// Read-only snapshot. Never blocks the delivery path: it only ever
    /// takes the map's read lock, never a topic's own lock.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let topics: Vec<(String, Arc<TopicCounters>)> = self
            .topics
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut total_published = 0;
        let mut total_delivered = 0;
        let mut total_dropped = 0;
        let mut out = Vec::with_capacity(topics.len());

        for (name, counters) in topics {
            let published = counters.messages_published.load(Ordering::Relaxed);
            let delivered = counters.messages_delivered.load(Ordering::Relaxed);
            let dropped = counters.messages_dropped.load(Ordering::Relaxed);
            let latencies = counters.latencies_ms.lock();
            let avg_latency_ms = if latencies.is_empty() {
                0.0
            } else {
                latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
            };
            drop(latencies);

            total_published += published;
            total_delivered += delivered;
            total_dropped += dropped;

            out.push(TopicMetricsSnapshot {
                topic: name,
                messages_published: published,
                messages_delivered: delivered,
                messages_dropped: dropped,
                queue_depth: counters.queue_depth.load(Ordering::Relaxed),
                subscriber_count: counters.subscriber_count.load(Ordering::Relaxed),
                avg_latency_ms,
            });
        }

        MetricsSnapshot {
            topics: out,
            total_messages_published: total_published,
            total_messages_delivered: total_delivered,
            total_messages_dropped: total_dropped,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_and_delivered_aggregate_globally() {
        let registry = MetricsRegistry::new();
        registry.record_published("a");
        registry.record_published("b");
        registry.record_delivered("a", 3);
        let snap = registry.snapshot();
        assert_eq!(snap.total_messages_published, 2);
        assert_eq!(snap.total_messages_delivered, 3);
    }

    #[test]
    fn latency_average_reflects_recorded_samples() {
        let registry = MetricsRegistry::new();
        registry.record_latency("t", Duration::from_millis(10));
        registry.record_latency("t", Duration::from_millis(20));
        let snap = registry.snapshot();
        let t = snap.topics.iter().find(|t| t.topic == "t").unwrap();
        assert_eq!(t.avg_latency_ms, 15.0);
    }

    #[test]
    fn remove_topic_drops_it_from_snapshot() {
        let registry = MetricsRegistry::new();
        registry.record_published("t");
        registry.remove_topic("t");
        let snap = registry.snapshot();
        assert!(snap.topics.is_empty());
    }
}
