//! Logging configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Smallest accepted journal file cap (exclusive)
pub const MIN_LOG_SIZE: u64 = 100 * 1024;

/// Largest accepted journal file cap (inclusive)
pub const MAX_LOG_SIZE: u64 = 1024 * 1024 * 1024;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console log level
    #[serde(default)]
    pub level: LogLevel,

    /// Directory receiving the message, error and summary journal files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Per-file size cap in bytes; the run stops when any journal file reaches it
    #[serde(default = "default_max_log_size")]
    pub max_log_size: u64,
}

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive string understood by tracing's `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_dir: default_log_dir(),
            max_log_size: default_max_log_size(),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl Validatable for LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(
            &self.log_dir.to_string_lossy(),
            "log_dir",
            self.domain_name(),
        )?;

        if self.max_log_size <= MIN_LOG_SIZE || self.max_log_size > MAX_LOG_SIZE {
            return Err(self.validation_error(format!(
                "max_log_size must be above {} and at most {} bytes, got {}",
                MIN_LOG_SIZE, MAX_LOG_SIZE, self.max_log_size
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "logging"
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_max_log_size() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("WARNING").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn test_max_log_size_bounds() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.max_log_size = MIN_LOG_SIZE;
        assert!(config.validate().is_err());

        config.max_log_size = MIN_LOG_SIZE + 1;
        assert!(config.validate().is_ok());

        config.max_log_size = MAX_LOG_SIZE;
        assert!(config.validate().is_ok());

        config.max_log_size = MAX_LOG_SIZE + 1;
        assert!(config.validate().is_err());
    }
}
