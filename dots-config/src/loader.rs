//! Configuration loading and environment variable handling

use crate::domains::DotsConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "DOTS".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<DotsConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: DotsConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<DotsConfig> {
        let mut config = DotsConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<DotsConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut DotsConfig) -> ConfigResult<()> {
        self.apply_run_overrides(&mut config.run)?;
        self.apply_database_overrides(&mut config.database)?;
        self.apply_perf_overrides(&mut config.perf)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_run_overrides(&self, config: &mut crate::domains::run::RunConfig) -> ConfigResult<()> {
        if let Ok(duration) = self.get_env_var("DURATION") {
            config.duration = humantime_serde::re::humantime::parse_duration(&duration)
                .map_err(|e| ConfigError::EnvError(format!("Invalid DURATION: {}", e)))?;
        }

        if let Ok(workload) = self.get_env_var("WORKLOAD") {
            config.workload = workload;
        }

        Ok(())
    }

    fn apply_database_overrides(
        &self,
        config: &mut crate::domains::database::DatabaseConfig,
    ) -> ConfigResult<()> {
        if let Ok(url) = self.get_env_var("DB_URL") {
            config.url = url;
        }

        if let Ok(user) = self.get_env_var("DB_USER") {
            config.user = user;
        }

        if let Ok(password) = self.get_env_var("DB_PASSWORD") {
            config.password = password;
        }

        Ok(())
    }

    fn apply_perf_overrides(&self, config: &mut crate::domains::perf::PerfConfig) -> ConfigResult<()> {
        if let Ok(host) = self.get_env_var("PERF_HOST") {
            config.host = host;
        }

        if let Ok(port) = self.get_env_var("PERF_PORT") {
            config.port = port
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid PERF_PORT: {}", e)))?;
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(dir) = self.get_env_var("LOG_DIR") {
            config.log_dir = dir.into();
        }

        if let Ok(size) = self.get_env_var("MAX_LOG_SIZE") {
            config.max_log_size = crate::domains::utils::parse_byte_size(&size)
                .map_err(|e| ConfigError::EnvError(format!("Invalid MAX_LOG_SIZE: {}", e)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
