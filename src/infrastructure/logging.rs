//! Logging system initialization
//!
//! Console logging through `tracing` with an env-filter. The configured
//! level applies to this crate; chatty dependencies are capped at `warn`
//! unless `RUST_LOG` overrides the whole filter.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::infrastructure::config::LoggingConfig;

/// Initializes the global subscriber. Errors if called twice.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}

fn default_directives(level: &str) -> String {
    format!("fourpaws_harvester={level},hyper=warn,reqwest=warn")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cap_dependency_noise() {
        let directives = default_directives("debug");
        assert!(directives.contains("fourpaws_harvester=debug"));
        assert!(directives.contains("hyper=warn"));
    }
}
