//! Domain-specific configuration modules

pub mod database;
pub mod logging;
pub mod perf;
pub mod run;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Complete, immutable DOTS run configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DotsConfig {
    /// Run length, concurrency policy and reporting cadence
    #[serde(default)]
    pub run: run::RunConfig,

    /// Target database
    #[serde(default)]
    pub database: database::DatabaseConfig,

    /// Performance relay endpoint
    #[serde(default)]
    pub perf: perf::PerfConfig,

    /// Console logging and journal files
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl DotsConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.run.validate()?;
        self.database.validate()?;
        self.perf.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        DotsConfig::default()
            .to_yaml()
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
