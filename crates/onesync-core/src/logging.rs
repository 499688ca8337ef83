//! Tracing subscriber setup
//!
//! The library crates only emit `tracing` events; binaries and test harnesses
//! that embed them call [`init`] once to install a subscriber. `RUST_LOG`
//! overrides the configured level when set.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Builds the filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Installs a global fmt subscriber according to `config`.
///
/// # Errors
/// Returns an error if a global subscriber has already been installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true);

    if config.json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to install JSON tracing subscriber")
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to install tracing subscriber")
    }
}
