//! Wire message schema
//!
//! Plain serde enums matching §6 of the message schema exactly. This is the
//! only contract the core has with the transport framing; `Dispatcher` is the
//! sole consumer/producer of these types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        topic: String,
        #[serde(default)]
        last_n: usize,
    },
    Unsubscribe {
        topic: String,
    },
    Publish {
        topic: String,
        data: Value,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Info {
        message: String,
    },
    Ack {
        request_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        message: String,
    },
    Event {
        topic: String,
        data: Value,
        message_id: String,
        ts: chrono::DateTime<chrono::Utc>,
    },
    Error {
        code: String,
        message: String,
        details: Value,
    },
    Pong,
}

impl ServerMessage {
    pub fn ack(request_type: &str, topic: Option<String>, message: impl Into<String>) -> Self {
        ServerMessage::Ack {
            request_type: request_type.to_string(),
            topic,
            message: message.into(),
        }
    }

    pub fn error(err: &crate::bus::error::BusError) -> Self {
        let mut details = serde_json::Map::new();
        if let Some(retry) = err.retry_after_secs() {
            details.insert("retry_after_seconds".into(), serde_json::json!(retry));
        }
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            details: Value::Object(details),
        }
    }
}
