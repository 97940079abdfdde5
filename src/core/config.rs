//! Bus configuration
//!
//! Layered the way `AppConfig::load` in the teacher is: built-in defaults,
//! optionally overlaid by a JSON file, then overridden by CLI flags (which
//! carry their own env var fallbacks via `clap`'s `env = "..."`).

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::cli::Cli;
use super::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT_MS, DEFAULT_INGRESS_QUEUE_CAPACITY,
    DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_RPS, DEFAULT_RING_CAPACITY,
    DEFAULT_SEND_DEADLINE_MS, DEFAULT_SHUTDOWN_DEADLINE_SECS, MAX_LAST_N, MAX_PAYLOAD_BYTES,
};

/// How a topic's ingress queue behaves once it is full.
///
/// spec.md §7 requires exactly one of these to be chosen at build time;
/// `EvictOldest` is the documented default. Both are implemented so the
/// trade-off spec.md discusses is visible and testable, not just described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FullQueuePolicy {
    /// Reject the publish with `QUEUE_FULL`; the message is never enqueued.
    RejectNewest,
    /// Evict the oldest queued message and accept the new one.
    #[default]
    EvictOldest,
}

impl fmt::Display for FullQueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullQueuePolicy::RejectNewest => write!(f, "reject_newest"),
            FullQueuePolicy::EvictOldest => write!(f, "evict_oldest"),
        }
    }
}

/// Resolved bus configuration, after defaults/file/CLI layering.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub ingress_queue_capacity: usize,
    pub ring_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub send_deadline: Duration,
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
    pub shutdown_deadline: Duration,
    pub full_queue_policy: FullQueuePolicy,
    pub max_payload_bytes: usize,
    pub max_last_n: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            ingress_queue_capacity: DEFAULT_INGRESS_QUEUE_CAPACITY,
            ring_capacity: DEFAULT_RING_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
            send_deadline: Duration::from_millis(DEFAULT_SEND_DEADLINE_MS),
            rate_limit_rps: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            shutdown_deadline: Duration::from_secs(DEFAULT_SHUTDOWN_DEADLINE_SECS),
            full_queue_policy: FullQueuePolicy::default(),
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            max_last_n: MAX_LAST_N,
        }
    }
}

/// Optional JSON overlay file. Every field is optional; anything left unset
/// falls through to the built-in default or the CLI value.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    ingress_queue_capacity: Option<usize>,
    ring_capacity: Option<usize>,
    batch_size: Option<usize>,
    batch_timeout_ms: Option<u64>,
    send_deadline_ms: Option<u64>,
    rate_limit_rps: Option<u32>,
    rate_limit_burst: Option<u32>,
    shutdown_deadline_secs: Option<u64>,
    full_queue_policy: Option<FullQueuePolicy>,
    max_payload_bytes: Option<usize>,
    max_last_n: Option<usize>,
}

impl FileConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }
}

impl BusConfig {
    /// Load configuration from all sources.
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. JSON file (`--config`, if given)
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &Cli) -> Result<Self> {
        let defaults = Self::default();

        let file_config = match &cli.config {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading bus config overlay");
                FileConfig::load_from_file(path)?
            }
            None => FileConfig::default(),
        };

        Ok(Self {
            ingress_queue_capacity: cli
                .queue_capacity
                .or(file_config.ingress_queue_capacity)
                .unwrap_or(defaults.ingress_queue_capacity),
            ring_capacity: cli
                .ring_capacity
                .or(file_config.ring_capacity)
                .unwrap_or(defaults.ring_capacity),
            batch_size: cli
                .batch_size
                .or(file_config.batch_size)
                .unwrap_or(defaults.batch_size),
            batch_timeout: Duration::from_millis(
                cli.batch_timeout_ms
                    .or(file_config.batch_timeout_ms)
                    .unwrap_or(DEFAULT_BATCH_TIMEOUT_MS),
            ),
            send_deadline: Duration::from_millis(
                cli.send_deadline_ms
                    .or(file_config.send_deadline_ms)
                    .unwrap_or(DEFAULT_SEND_DEADLINE_MS),
            ),
            rate_limit_rps: cli
                .rate_limit_rps
                .or(file_config.rate_limit_rps)
                .unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: cli
                .rate_limit_burst
                .or(file_config.rate_limit_burst)
                .unwrap_or(defaults.rate_limit_burst),
            shutdown_deadline: Duration::from_secs(
                cli.shutdown_deadline_secs
                    .or(file_config.shutdown_deadline_secs)
                    .unwrap_or(DEFAULT_SHUTDOWN_DEADLINE_SECS),
            ),
            full_queue_policy: file_config.full_queue_policy.unwrap_or_default(),
            max_payload_bytes: cli
                .max_payload_bytes
                .or(file_config.max_payload_bytes)
                .unwrap_or(defaults.max_payload_bytes),
            max_last_n: cli
                .max_last_n
                .or(file_config.max_last_n)
                .unwrap_or(defaults.max_last_n),
        })
    }
}
