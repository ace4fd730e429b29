//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Database Opensource Test Suite load harness", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workload against the configured database
    Run {
        /// Workload name or case id, overriding the configuration
        #[arg(long, value_name = "NAME")]
        workload: Option<String>,

        /// Run length, e.g. "2h 30m", overriding the configuration
        #[arg(long, value_name = "DURATION")]
        duration: Option<String>,

        /// Unattended run: do not read STOP commands from stdin
        #[arg(long)]
        auto: bool,
    },

    /// Serve this host's performance counters to samplers
    Relay {
        /// Address to listen on
        #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:9876")]
        bind: String,
    },

    /// Create the tables a workload uses
    Prepare {
        /// Workload name or case id, overriding the configuration
        #[arg(long, value_name = "NAME")]
        workload: Option<String>,
    },

    /// List the available workloads
    Workloads,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Write a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the configuration that would be used
    Show,
}
