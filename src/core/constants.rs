//! Default tunables and environment variable names
//!
//! Every default here corresponds to a value `spec.md` leaves to the
//! implementer ("implementer's choice; documented"). See `DESIGN.md` for the
//! reasoning behind each pick.

// =============================================================================
// Application
// =============================================================================

pub const APP_NAME: &str = "topicbus";
pub const ENV_LOG: &str = "TOPICBUS_LOG";
pub const ENV_CONFIG: &str = "TOPICBUS_CONFIG";

// =============================================================================
// Topic sizing
// =============================================================================

/// Ingress queue capacity (Q). spec.md §3 suggests 500–10000; 1000 is the
/// mid-point, picked for small default memory footprint per topic.
pub const DEFAULT_INGRESS_QUEUE_CAPACITY: usize = 1000;
pub const ENV_INGRESS_QUEUE_CAPACITY: &str = "TOPICBUS_QUEUE_CAPACITY";

/// Replay ring capacity (R).
pub const DEFAULT_RING_CAPACITY: usize = 100;
pub const ENV_RING_CAPACITY: &str = "TOPICBUS_RING_CAPACITY";

// =============================================================================
// Delivery worker
// =============================================================================

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const ENV_BATCH_SIZE: &str = "TOPICBUS_BATCH_SIZE";

pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 20;
pub const ENV_BATCH_TIMEOUT_MS: &str = "TOPICBUS_BATCH_TIMEOUT_MS";

pub const DEFAULT_SEND_DEADLINE_MS: u64 = 500;
pub const ENV_SEND_DEADLINE_MS: &str = "TOPICBUS_SEND_DEADLINE_MS";

// =============================================================================
// Rate limiting (per-subscriber token bucket)
// =============================================================================

pub const DEFAULT_RATE_LIMIT_RPS: u32 = 1000;
pub const ENV_RATE_LIMIT_RPS: &str = "TOPICBUS_RATE_LIMIT_RPS";

pub const DEFAULT_RATE_LIMIT_BURST: u32 = 500;
pub const ENV_RATE_LIMIT_BURST: &str = "TOPICBUS_RATE_LIMIT_BURST";

// =============================================================================
// Limits
// =============================================================================

pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;
pub const ENV_MAX_PAYLOAD_BYTES: &str = "TOPICBUS_MAX_PAYLOAD_BYTES";

pub const MAX_LAST_N: usize = 1000;
pub const ENV_MAX_LAST_N: &str = "TOPICBUS_MAX_LAST_N";

pub const MAX_TOPIC_NAME_LEN: usize = 256;

// =============================================================================
// Shutdown
// =============================================================================

pub const DEFAULT_SHUTDOWN_DEADLINE_SECS: u64 = 5;
pub const ENV_SHUTDOWN_DEADLINE_SECS: &str = "TOPICBUS_SHUTDOWN_DEADLINE_SECS";
