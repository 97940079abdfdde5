//! Directory of topics: atomic create/delete, coordinated shutdown.
//!
//! Exactly one `Topic` exists per live name at any time. The manager lock
//! (the `topics` map) is never held across an `.await` that could block on
//! subscriber I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::core::config::BusConfig;

use super::error::BusError;
use super::message::validate_topic_name;
use super::metrics::{MetricsRegistry, MetricsSnapshot};
use super::topic::{Topic, TopicStats};

pub struct TopicManager {
    config: Arc<BusConfig>,
    metrics: Arc<MetricsRegistry>,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    shutting_down: AtomicBool,
}

impl TopicManager {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(MetricsRegistry::new()),
            topics: RwLock::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> Arc<BusConfig> {
        self.config.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    /// Readable shutdown flag the out-of-core control plane is expected to
    /// consult before accepting mutating requests.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Idempotent: a second create for the same name returns the existing
    /// topic with `created = false`.
    pub fn create(&self, name: &str) -> Result<(Arc<Topic>, bool), BusError> {
        validate_topic_name(name)?;
        if self.is_shutting_down() {
            return Err(BusError::ShuttingDown);
        }

        if let Some(existing) = self.topics.read().get(name) {
            return Ok((existing.clone(), false));
        }

        let mut topics = self.topics.write();
        if let Some(existing) = topics.get(name) {
            return Ok((existing.clone(), false));
        }
        let topic = Topic::spawn(name.to_string(), self.config.clone(), self.metrics.clone());
        topics.insert(name.to_string(), topic.clone());
        Ok((topic, true))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.read().get(name).cloned()
    }

    /// New list each call; iteration order is not meaningful.
    pub fn list(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    /// Per-topic lifecycle/queue/subscriber counts, for the control-plane
    /// `stats` endpoint. New list each call; order is not meaningful.
    pub fn stats(&self) -> Vec<TopicStats> {
        self.topics.read().values().map(|t| t.stats()).collect()
    }

    /// Read-only aggregate counters/gauges, for the control-plane `metrics`
    /// endpoint.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Transitions the topic to Draining, awaits worker exit, then removes
    /// it from the map. A second delete for the same name returns
    /// `TOPIC_NOT_FOUND`.
    pub async fn delete(&self, name: &str) -> Result<(), BusError> {
        let topic = self.topics.read().get(name).cloned();
        match topic {
            None => Err(BusError::TopicNotFound(name.to_string())),
            Some(topic) => {
                topic.shutdown(self.config.shutdown_deadline).await;
                self.topics.write().remove(name);
                self.metrics.remove_topic(name);
                Ok(())
            }
        }
    }

    /// Drains every topic concurrently, bounded by `deadline`; any workers
    /// still running past it are abandoned (their tasks are dropped along
    /// with the process during a real shutdown; in-process, the `timeout`
    /// in `Topic::shutdown` already logs the straggler).
    pub async fn shutdown_all(&self, deadline: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let topics: Vec<Arc<Topic>> = self.topics.read().values().cloned().collect();
        futures::future::join_all(topics.iter().map(|t| t.shutdown(deadline))).await;
        self.topics.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TopicManager {
        TopicManager::new(BusConfig::default())
    }

    #[test]
    fn create_is_idempotent() {
        let mgr = manager();
        let (_, created1) = mgr.create("t").unwrap();
        let (_, created2) = mgr.create("t").unwrap();
        assert!(created1);
        assert!(!created2);
    }

    #[test]
    fn create_rejects_invalid_name() {
        let mgr = manager();
        assert!(mgr.create("").is_err());
        assert!(mgr.create("bad name!").is_err());
    }

    #[tokio::test]
    async fn delete_twice_is_not_found_on_second() {
        let mgr = manager();
        mgr.create("t").unwrap();
        assert!(mgr.delete("t").await.is_ok());
        assert_eq!(mgr.delete("t").await.unwrap_err().code(), "TOPIC_NOT_FOUND");
    }

    #[tokio::test]
    async fn delete_then_recreate_starts_empty() {
        let mgr = manager();
        let (topic, _) = mgr.create("t").unwrap();
        topic.publish(serde_json::json!({ "i": 1 })).unwrap();
        mgr.delete("t").await.unwrap();

        let (topic2, created) = mgr.create("t").unwrap();
        assert!(created);
        assert_eq!(topic2.stats().ring_len, 0);
        assert_eq!(topic2.stats().subscriber_count, 0);
    }

    #[tokio::test]
    async fn shutdown_all_drains_every_topic_and_blocks_new_creates() {
        let mgr = manager();
        mgr.create("a").unwrap();
        mgr.create("b").unwrap();
        mgr.shutdown_all(Duration::from_secs(5)).await;
        assert!(mgr.is_shutting_down());
        assert!(mgr.list().is_empty());
        assert!(mgr.create("c").is_err());
    }

    #[test]
    fn list_reflects_live_topics() {
        let mgr = manager();
        mgr.create("a").unwrap();
        mgr.create("b").unwrap();
        let mut names = mgr.list();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn stats_and_metrics_snapshot_cover_every_live_topic() {
        let mgr = manager();
        let (topic, _) = mgr.create("a").unwrap();
        topic.publish(serde_json::json!({ "i": 1 })).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "a");

        let snapshot = mgr.metrics_snapshot();
        assert_eq!(snapshot.total_messages_published, 1);
    }
}
