//! Wire-visible error codes
//!
//! One variant per error code in the message schema. `code()` returns the
//! stable string the dispatcher puts on the wire, so there is exactly one
//! place that maps a failure to its wire representation.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("not subscribed to topic: {0}")]
    NotSubscribed(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("queue full")]
    QueueFull,

    #[error("shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl BusError {
    /// Stable wire code for this error, matching the message schema.
    pub fn code(&self) -> &'static str {
        match self {
            BusError::InvalidJson(_) => "INVALID_JSON",
            BusError::InvalidMessage(_) => "INVALID_MESSAGE",
            BusError::UnknownMessageType(_) => "UNKNOWN_MESSAGE_TYPE",
            BusError::ValidationError(_) => "VALIDATION_ERROR",
            BusError::TopicNotFound(_) => "TOPIC_NOT_FOUND",
            BusError::NotSubscribed(_) => "NOT_SUBSCRIBED",
            BusError::RateLimited { .. } => "RATE_LIMITED",
            BusError::QueueFull => "QUEUE_FULL",
            BusError::ShuttingDown => "SHUTTING_DOWN",
            BusError::Internal(_) => "INTERNAL",
        }
    }

    /// `retry_after_secs` extra field carried by `RATE_LIMITED` frames, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            BusError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_schema_strings() {
        assert_eq!(BusError::InvalidJson("x".into()).code(), "INVALID_JSON");
        assert_eq!(BusError::TopicNotFound("t".into()).code(), "TOPIC_NOT_FOUND");
        assert_eq!(
            BusError::RateLimited { retry_after_secs: 2 }.code(),
            "RATE_LIMITED"
        );
        assert_eq!(BusError::QueueFull.code(), "QUEUE_FULL");
        assert_eq!(BusError::ShuttingDown.code(), "SHUTTING_DOWN");
    }

    #[test]
    fn retry_after_only_present_on_rate_limited() {
        assert_eq!(
            BusError::RateLimited { retry_after_secs: 3 }.retry_after_secs(),
            Some(3)
        );
        assert_eq!(BusError::QueueFull.retry_after_secs(), None);
    }
}
