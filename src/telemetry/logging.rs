//! Log subscriber setup.
//!
//! RUST_LOG wins over the `[logging]` table, which wins over the default
//! of info level in pretty format.

use crate::config::{LoggingLock, DEFAULT_LOG_FORMAT, DEFAULT_LOG_LEVEL};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    /// Unknown names fall back to pretty; validation already reported them.
    pub fn from_name(name: &str) -> Self {
        match name {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Resolved `[logging]` settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: parse_level(DEFAULT_LOG_LEVEL),
            format: LogFormat::from_name(DEFAULT_LOG_FORMAT),
        }
    }
}

impl From<&LoggingLock> for LogConfig {
    fn from(lock: &LoggingLock) -> Self {
        Self {
            level: parse_level(&lock.level),
            format: LogFormat::from_name(&lock.format),
        }
    }
}

fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.level.as_str())
    }
}

/// Install the global subscriber. A second call keeps the first one.
pub fn init_logging(config: Option<&LogConfig>) {
    let config = config.cloned().unwrap_or_default();
    let filter = env_filter(&config);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE),
            ),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().compact()),
        ),
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(registry.with(tracing_subscriber::fmt::layer()))
        }
    };
    if installed.is_err() {
        tracing::debug!("Log subscriber already installed");
    }
}
