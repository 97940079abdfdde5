//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;

pub use cli::Cli;
pub use config::{BusConfig, FullQueuePolicy};
pub use shutdown::ShutdownService;
