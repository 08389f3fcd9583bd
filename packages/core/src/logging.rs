//! Logging initialisation helper.

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber with the given filter
/// (`RUST_LOG` syntax, e.g. `"info"` or `"verso_core=debug"`).
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_new(level).context("invalid log filter")?)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging already initialized: {e}"))
}
