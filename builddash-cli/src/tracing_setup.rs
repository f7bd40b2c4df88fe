//! Tracing setup for the builddash CLI
//!
//! Usage:
//!   builddash --debug ...                 # Debug logging to console
//!   RUST_LOG=builddash_server=debug ...   # Fine-grained log control

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Enable debug logging (sets debug level if RUST_LOG is not set)
    pub debug: bool,
}

/// Initialize console tracing
pub fn init(config: &TracingConfig) -> Result<()> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug) // Show targets in debug mode
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}
