use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Filter precedence: explicit level, then `RUST_LOG`, then `fallback`.
pub fn build_filter(level: Option<&str>, fallback: &str) -> Result<EnvFilter> {
    match level {
        Some(level) => EnvFilter::try_new(level).map_err(|e| anyhow!("invalid log filter {:?}: {}", level, e)),
        None => Ok(EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

/// Install the global subscriber. Library crates log through `log`; the
/// subscriber's log bridge picks those records up.
pub fn init(level: Option<&str>, fallback: &str) -> Result<()> {
    let filter = build_filter(level, fallback)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
