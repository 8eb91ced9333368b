//! Configuration validation

use super::{
    Config, DEFAULT_ACCESS_PRIORITY, DEFAULT_BROADCAST_CACHE_WINDOW_MS, DEFAULT_HARD_TIMEOUT,
    DEFAULT_IDLE_TIMEOUT, PRIMARY_KEY_VALUE,
};

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_flow(config, &mut result);
    validate_forwarding(config, &mut result);
    validate_logging(config, &mut result);
    validate_forwarding_rows(config, &mut result);

    result
}

fn validate_flow(config: &Config, result: &mut ValidationResult) {
    match config.flow.idle_timeout {
        None => result.warn(format!(
            "flow: idle_timeout not specified, using default {}",
            DEFAULT_IDLE_TIMEOUT
        )),
        Some(0) => {
            if config.flow.hard_timeout.unwrap_or(DEFAULT_HARD_TIMEOUT) == 0 {
                result.warn("flow: idle_timeout and hard_timeout are both 0, flows never expire");
            }
        }
        Some(_) => {}
    }
}

fn validate_forwarding(config: &Config, result: &mut ValidationResult) {
    let fwd = &config.forwarding;

    if fwd.access_priority.is_none() {
        result.warn(format!(
            "forwarding: access_priority not specified, using default {}",
            DEFAULT_ACCESS_PRIORITY
        ));
    }

    if fwd.broadcast_cache.unwrap_or(true) {
        match fwd.broadcast_cache_window_ms {
            None => result.warn(format!(
                "forwarding: broadcast_cache_window_ms not specified, using default {}",
                DEFAULT_BROADCAST_CACHE_WINDOW_MS
            )),
            Some(0) => result.error(
                "forwarding: broadcast_cache_window_ms must be positive when broadcast_cache is enabled",
            ),
            Some(_) => {}
        }
    }
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let Some(logging) = &config.logging else {
        return;
    };

    if let Some(level) = &logging.level {
        let known = ["error", "warn", "info", "debug", "trace"];
        if !known.contains(&level.to_lowercase().as_str()) {
            result.warn(format!("logging: unknown level '{}', using info", level));
        }
    }

    if let Some(format) = &logging.format {
        if !["pretty", "compact", "json"].contains(&format.as_str()) {
            result.error(format!(
                "logging: format '{}' must be one of pretty, compact, json",
                format
            ));
        }
    }
}

fn validate_forwarding_rows(config: &Config, result: &mut ValidationResult) {
    let rows: Vec<_> = config
        .controller_forwardingconfig
        .iter()
        .filter(|row| row.id == PRIMARY_KEY_VALUE)
        .collect();

    if rows.len() > 1 {
        result.error(format!(
            "controller_forwardingconfig: {} rows with id '{}'",
            rows.len(),
            PRIMARY_KEY_VALUE
        ));
    }

    for row in rows {
        if let Some(value) = &row.access_priority {
            if value.trim().parse::<u16>().is_err() {
                result.warn(format!(
                    "controller_forwardingconfig.{}: access_priority '{}' is not a number, using default {}",
                    row.id, value, DEFAULT_ACCESS_PRIORITY
                ));
            }
        }
    }

    for row in config
        .controller_forwardingconfig
        .iter()
        .filter(|row| row.id != PRIMARY_KEY_VALUE)
    {
        result.warn(format!(
            "controller_forwardingconfig.{}: unknown id, ignored",
            row.id
        ));
    }
}
