//! Command-line interface
//!
//! Mirrors the teacher's `core::cli::Cli`: a flat `clap::Parser` struct whose
//! fields are `Option<T>` so "not given on the command line" is distinguishable
//! from "given, value X" during config layering. Every flag falls back to an
//! environment variable before falling back to a built-in default.

use std::path::PathBuf;

use clap::Parser;

use super::constants::{
    APP_NAME, ENV_BATCH_SIZE, ENV_BATCH_TIMEOUT_MS, ENV_CONFIG, ENV_INGRESS_QUEUE_CAPACITY,
    ENV_LOG, ENV_MAX_LAST_N, ENV_MAX_PAYLOAD_BYTES, ENV_RATE_LIMIT_BURST, ENV_RATE_LIMIT_RPS,
    ENV_RING_CAPACITY, ENV_SEND_DEADLINE_MS, ENV_SHUTDOWN_DEADLINE_SECS,
};

#[derive(Parser, Debug, Clone)]
#[command(name = APP_NAME, version, about = "In-process publish/subscribe delivery engine", long_about = None)]
pub struct Cli {
    /// Path to a JSON config file overlaying the built-in defaults.
    #[arg(long, global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Tracing filter directive, e.g. "info" or "topicbus=debug".
    #[arg(long, global = true, env = ENV_LOG)]
    pub log: Option<String>,

    /// Per-topic ingress queue capacity.
    #[arg(long, global = true, env = ENV_INGRESS_QUEUE_CAPACITY)]
    pub queue_capacity: Option<usize>,

    /// Per-topic replay ring capacity.
    #[arg(long, global = true, env = ENV_RING_CAPACITY)]
    pub ring_capacity: Option<usize>,

    /// Maximum number of messages the delivery worker batches per flush.
    #[arg(long, global = true, env = ENV_BATCH_SIZE)]
    pub batch_size: Option<usize>,

    /// Maximum time the delivery worker waits to fill a batch, in milliseconds.
    #[arg(long, global = true, env = ENV_BATCH_TIMEOUT_MS)]
    pub batch_timeout_ms: Option<u64>,

    /// Deadline for a single subscriber send, in milliseconds.
    #[arg(long, global = true, env = ENV_SEND_DEADLINE_MS)]
    pub send_deadline_ms: Option<u64>,

    /// Per-subscriber token bucket refill rate, in requests per second.
    #[arg(long, global = true, env = ENV_RATE_LIMIT_RPS)]
    pub rate_limit_rps: Option<u32>,

    /// Per-subscriber token bucket burst capacity.
    #[arg(long, global = true, env = ENV_RATE_LIMIT_BURST)]
    pub rate_limit_burst: Option<u32>,

    /// Deadline for graceful shutdown to complete, in seconds.
    #[arg(long, global = true, env = ENV_SHUTDOWN_DEADLINE_SECS)]
    pub shutdown_deadline_secs: Option<u64>,

    /// Maximum serialised payload size accepted on publish, in bytes.
    #[arg(long, global = true, env = ENV_MAX_PAYLOAD_BYTES)]
    pub max_payload_bytes: Option<usize>,

    /// Maximum `last_n` a subscribe request may request for replay.
    #[arg(long, global = true, env = ENV_MAX_LAST_N)]
    pub max_last_n: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_with_no_arguments() {
        let cli = Cli::parse_from(["topicbus"]);
        assert!(cli.config.is_none());
        assert!(cli.queue_capacity.is_none());
    }

    #[test]
    fn parses_explicit_overrides() {
        let cli = Cli::parse_from(["topicbus", "--ring-capacity", "250", "--batch-size", "5"]);
        assert_eq!(cli.ring_capacity, Some(250));
        assert_eq!(cli.batch_size, Some(5));
    }
}
