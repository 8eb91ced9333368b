//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_IDLE_TIMEOUT: u16 = 5;
pub const DEFAULT_HARD_TIMEOUT: u16 = 0;
pub const DEFAULT_ACCESS_PRIORITY: u16 = 10;
pub const DEFAULT_BROADCAST_CACHE: bool = true;
pub const DEFAULT_BROADCAST_CACHE_WINDOW_MS: u64 = 5000;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_FORMAT: &str = "pretty";

/// Primary key of the persisted forwarding record
pub const PRIMARY_KEY_VALUE: &str = "forwarding";

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    /// Rows of the persisted forwarding configuration table
    #[serde(default)]
    pub controller_forwardingconfig: Vec<ForwardingConfigRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowConfig {
    pub idle_timeout: Option<u16>,
    pub hard_timeout: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardingConfig {
    pub access_priority: Option<u16>,
    pub broadcast_cache: Option<bool>,
    pub broadcast_cache_window_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// One row of `controller_forwardingconfig`. The priority is stored as text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForwardingConfigRow {
    pub id: String,
    #[serde(default)]
    pub access_priority: Option<String>,
}

impl ForwardingConfigRow {
    pub fn new(id: impl Into<String>, access_priority: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access_priority: Some(access_priority.into()),
        }
    }
}

// ============================================================================
// Lock file types (generated, includes all defaults)
// ============================================================================

/// Generated lock file with all defaults filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLock {
    pub generated_at: String,
    pub flow: FlowLock,
    pub forwarding: ForwardingLock,
    pub logging: LoggingLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowLock {
    pub idle_timeout: u16,
    pub hard_timeout: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingLock {
    pub access_priority: u16,
    pub broadcast_cache: bool,
    pub broadcast_cache_window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingLock {
    pub level: String,
    pub format: String,
}

impl ConfigLock {
    pub fn from_config(config: &Config) -> Self {
        let settings = ForwardingSettings::from_config(config);
        let logging = config.logging.clone().unwrap_or_default();

        ConfigLock {
            generated_at: chrono::Utc::now().to_rfc3339(),
            flow: FlowLock {
                idle_timeout: settings.idle_timeout,
                hard_timeout: settings.hard_timeout,
            },
            forwarding: ForwardingLock {
                access_priority: settings.access_priority,
                broadcast_cache: settings.broadcast_cache,
                broadcast_cache_window_ms: settings.broadcast_cache_window.as_millis() as u64,
            },
            logging: LoggingLock {
                level: logging.level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
                format: logging
                    .format
                    .unwrap_or_else(|| DEFAULT_LOG_FORMAT.to_string()),
            },
        }
    }
}

/// Resolved runtime settings of the forwarding core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingSettings {
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub access_priority: u16,
    pub broadcast_cache: bool,
    pub broadcast_cache_window: Duration,
}

impl Default for ForwardingSettings {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            hard_timeout: DEFAULT_HARD_TIMEOUT,
            access_priority: DEFAULT_ACCESS_PRIORITY,
            broadcast_cache: DEFAULT_BROADCAST_CACHE,
            broadcast_cache_window: Duration::from_millis(DEFAULT_BROADCAST_CACHE_WINDOW_MS),
        }
    }
}

impl ForwardingSettings {
    /// A persisted `forwarding` row overrides `[forwarding].access_priority`.
    pub fn from_config(config: &Config) -> Self {
        let access_priority = if has_primary_row(&config.controller_forwardingconfig) {
            super::store::access_priority_from_rows(&config.controller_forwardingconfig)
        } else {
            config
                .forwarding
                .access_priority
                .unwrap_or(DEFAULT_ACCESS_PRIORITY)
        };

        Self {
            idle_timeout: config.flow.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT),
            hard_timeout: config.flow.hard_timeout.unwrap_or(DEFAULT_HARD_TIMEOUT),
            access_priority,
            broadcast_cache: config
                .forwarding
                .broadcast_cache
                .unwrap_or(DEFAULT_BROADCAST_CACHE),
            broadcast_cache_window: Duration::from_millis(
                config
                    .forwarding
                    .broadcast_cache_window_ms
                    .unwrap_or(DEFAULT_BROADCAST_CACHE_WINDOW_MS),
            ),
        }
    }
}

impl From<&ConfigLock> for ForwardingSettings {
    fn from(lock: &ConfigLock) -> Self {
        Self {
            idle_timeout: lock.flow.idle_timeout,
            hard_timeout: lock.flow.hard_timeout,
            access_priority: lock.forwarding.access_priority,
            broadcast_cache: lock.forwarding.broadcast_cache,
            broadcast_cache_window: Duration::from_millis(lock.forwarding.broadcast_cache_window_ms),
        }
    }
}

fn has_primary_row(rows: &[ForwardingConfigRow]) -> bool {
    rows.iter().any(|row| row.id == PRIMARY_KEY_VALUE)
}
