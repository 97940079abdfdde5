//! The unit of data flowing through a topic.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Instant;

use crate::core::constants::MAX_TOPIC_NAME_LEN;

use super::error::BusError;

/// `[A-Za-z0-9_-]{1,256}`
pub fn validate_topic_name(name: &str) -> Result<(), BusError> {
    if name.is_empty() || name.len() > MAX_TOPIC_NAME_LEN {
        return Err(BusError::ValidationError(format!(
            "topic name length must be 1..={MAX_TOPIC_NAME_LEN}, got {}",
            name.len()
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(BusError::ValidationError(
            "topic name must match [A-Za-z0-9_-]+".into(),
        ));
    }
    Ok(())
}

/// Immutable published record. Never mutated after construction; its
/// lifetime ends when evicted from the ring with no in-flight batch
/// referencing it, which in Rust simply falls out of `Arc` refcounting.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub topic: String,
    pub payload: Value,
    /// Monotonic instant of publish, for latency accounting.
    pub published_at: Instant,
    /// Wall-clock timestamp for external reporting (`ts` on the wire).
    pub ts: DateTime<Utc>,
    /// Per-topic publish sequence number, assigned under the same lock a
    /// subscriber is inserted under. Lets a subscriber's live delivery skip
    /// any message that was already enqueued before it joined.
    pub seq: u64,
}

/// Serialisability + size check, independent of any particular topic.
/// Exposed standalone so callers can validate a payload before they have
/// (or need) a `Message`, e.g. the dispatcher's publish path enforces this
/// ahead of rate limiting.
pub fn validate_payload_size(payload: &Value, max_payload_bytes: usize) -> Result<(), BusError> {
    let serialised = serde_json::to_vec(payload)
        .map_err(|e| BusError::ValidationError(format!("payload not serialisable: {e}")))?;
    if serialised.len() > max_payload_bytes {
        return Err(BusError::ValidationError(format!(
            "payload of {} bytes exceeds {} byte limit",
            serialised.len(),
            max_payload_bytes
        )));
    }
    Ok(())
}

impl Message {
    pub fn new(
        topic: String,
        payload: Value,
        max_payload_bytes: usize,
        seq: u64,
    ) -> Result<Self, BusError> {
        validate_topic_name(&topic)?;
        validate_payload_size(&payload, max_payload_bytes)?;
        Ok(Self {
            id: cuid2::create_id(),
            topic,
            payload,
            published_at: Instant::now(),
            ts: Utc::now(),
            seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 64 * 1024;

    #[test]
    fn rejects_empty_topic_name() {
        assert!(Message::new(String::new(), serde_json::json!({}), LIMIT, 0).is_err());
    }

    #[test]
    fn rejects_forbidden_characters() {
        assert!(Message::new("bad topic!".into(), serde_json::json!({}), LIMIT, 0).is_err());
    }

    #[test]
    fn accepts_payload_at_exactly_the_limit() {
        // One byte of JSON overhead per character; pad precisely to the cap.
        let filler = "a".repeat(LIMIT - 10);
        let payload = serde_json::json!({ "x": filler });
        let serialised = serde_json::to_vec(&payload).unwrap();
        assert!(serialised.len() <= LIMIT);
        assert!(Message::new("t".into(), payload, LIMIT, 0).is_ok());
    }

    #[test]
    fn rejects_payload_over_the_limit() {
        let filler = "a".repeat(LIMIT + 10);
        let payload = serde_json::json!({ "x": filler });
        let err = Message::new("t".into(), payload, LIMIT, 0).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn assigns_unique_ids() {
        let a = Message::new("t".into(), serde_json::json!(1), LIMIT, 0).unwrap();
        let b = Message::new("t".into(), serde_json::json!(2), LIMIT, 1).unwrap();
        assert_ne!(a.id, b.id);
    }
}
