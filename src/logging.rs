//! tracing subscriber setup for the binary
//!
//! The library only emits events; installing a subscriber is left to whoever
//! embeds it.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Console log settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `opcom_dam_prices=debug`
    pub log_level: String,

    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            with_target: false,
        }
    }
}

impl LoggingConfig {
    /// Read `RUST_LOG` (default `info`) and `LOG_WITH_TARGET`
    pub fn from_env() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            with_target: std::env::var("LOG_WITH_TARGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Check that `log_level` parses as an `EnvFilter` directive
    pub fn validate(&self) -> Result<(), String> {
        EnvFilter::try_new(&self.log_level)
            .map(|_| ())
            .map_err(|e| format!("Invalid RUST_LOG directive '{}': {}", self.log_level, e))
    }
}

/// Install the global subscriber; fails if one is already set
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
        .try_init()?;

    tracing::debug!(level = %config.log_level, "Logging initialized");
    Ok(())
}
