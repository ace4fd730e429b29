//! Run scheduling configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_range, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest accepted run
const MIN_DURATION: Duration = Duration::from_secs(60);

/// How the load controller decides whether to start another worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// Keep exactly this many workers running
    FixedConnections { connections: u32 },

    /// Keep adding workers while the smoothed CPU usage stays below `percent`
    #[serde(rename = "target_cpu")]
    TargetCpuPercent { percent: u32 },
}

impl Default for ConcurrencyMode {
    fn default() -> Self {
        ConcurrencyMode::FixedConnections { connections: 10 }
    }
}

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Name of the workload every worker executes
    #[serde(default = "default_workload")]
    pub workload: String,

    /// Wall-clock length of the run
    #[serde(with = "humantime_serde", default = "default_duration")]
    pub duration: Duration,

    /// Worker growth policy
    #[serde(default)]
    pub load: ConcurrencyMode,

    /// Base delay between two worker spawns, in minutes (1 to 5)
    #[serde(default = "default_creation_interval")]
    pub creation_interval_minutes: u32,

    /// Delay between two summary reports, in minutes
    #[serde(default = "default_summary_interval")]
    pub summary_interval_minutes: u32,

    /// Listen for an operator STOP command on stdin
    #[serde(default = "crate::domains::utils::default_true")]
    pub operator_console: bool,
}

impl RunConfig {
    pub fn creation_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.creation_interval_minutes) * 60)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.summary_interval_minutes) * 60)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workload: default_workload(),
            duration: default_duration(),
            load: ConcurrencyMode::default(),
            creation_interval_minutes: default_creation_interval(),
            summary_interval_minutes: default_summary_interval(),
            operator_console: true,
        }
    }
}

impl Validatable for RunConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.workload, "workload", self.domain_name())?;

        if self.duration <= MIN_DURATION {
            return Err(self.validation_error(format!(
                "duration must be longer than {}s, got {}s",
                MIN_DURATION.as_secs(),
                self.duration.as_secs()
            )));
        }

        match self.load {
            ConcurrencyMode::FixedConnections { connections } => {
                validate_positive(connections, "load.connections", self.domain_name())?;
            }
            ConcurrencyMode::TargetCpuPercent { percent } => {
                validate_range(percent, 11, 100, "load.percent", self.domain_name())?;
            }
        }

        validate_range(
            self.creation_interval_minutes,
            1,
            5,
            "creation_interval_minutes",
            self.domain_name(),
        )?;

        validate_positive(
            self.summary_interval_minutes,
            "summary_interval_minutes",
            self.domain_name(),
        )?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "run"
    }
}

// Default value functions
fn default_workload() -> String {
    "basic".to_string()
}

fn default_duration() -> Duration {
    Duration::from_secs(60 * 60) // 1 hour
}

fn default_creation_interval() -> u32 {
    1
}

fn default_summary_interval() -> u32 {
    10
}
