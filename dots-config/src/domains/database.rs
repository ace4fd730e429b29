//! Target database configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, validate_url, Validatable};
use serde::{Deserialize, Serialize};

/// Target database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Driver identifier, recorded in the journal and used by workloads for dialect quirks
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Database URL (e.g., "sqlite://dots.db?mode=rwc", "postgres://host/db")
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Login user, merged into the URL when the URL carries none
    #[serde(default)]
    pub user: String,

    /// Login password
    #[serde(default)]
    pub password: String,

    /// Row-count threshold beyond which workloads start deleting what they insert
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            url: default_database_url(),
            user: String::new(),
            password: String::new(),
            max_rows: default_max_rows(),
        }
    }
}

impl Validatable for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.driver, "driver", self.domain_name())?;
        validate_url(&self.url, "url", self.domain_name())?;

        if self.max_rows <= 1 {
            return Err(self.validation_error(format!(
                "max_rows must be greater than 1, got {}",
                self.max_rows
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "database"
    }
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_database_url() -> String {
    "sqlite://dots.db?mode=rwc".to_string()
}

fn default_max_rows() -> u64 {
    20_000
}
