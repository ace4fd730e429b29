use anyhow::{Context, Result};
use clap::Parser;
use dots_config::{ConfigLoader, DotsConfig};
use dots_core::{TerminationCause, TerminationFlag};
use dots_execution::{
    prepare_schema, ConnectionFactory, RunReport, RunSession, SqlxConnectionFactory, WorkloadRegistry,
};
use dots_logging::{init_simple_tracing, FileSink, RunJournal};
use dots_output::format_elapsed;
use dots_perf::{LineTransport, PerfRelay};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

mod cli;
mod console;

use cli::{Cli, Commands, ConfigCommands};

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<DotsConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => loader
            .from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path)),
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Run a workload until its duration elapses or it is stopped
async fn run_command(
    mut config: DotsConfig,
    workload: Option<String>,
    duration: Option<String>,
    auto: bool,
) -> Result<()> {
    if let Some(name) = workload {
        config.run.workload = name;
    }
    if let Some(duration) = duration {
        config.run.duration = humantime_serde::re::humantime::parse_duration(&duration)
            .with_context(|| format!("Invalid duration: {}", duration))?;
    }
    if auto {
        config.run.operator_console = false;
    }
    config.validate_all().context("Invalid run configuration")?;

    let workload = WorkloadRegistry::with_defaults()
        .resolve(&config.run.workload)
        .context("Cannot select workload")?;

    let termination = TerminationFlag::new();
    let case = workload.name().to_uppercase();
    let sink = FileSink::new(&config.logging.log_dir, &case, config.logging.max_log_size)
        .with_context(|| format!("Cannot open log files in {:?}", config.logging.log_dir))?;
    let journal = RunJournal::new(Arc::new(sink), termination.clone());

    let factory = SqlxConnectionFactory::new(&config.database).context("Invalid database settings")?;
    let perf_address = config.perf.address();
    let perf = LineTransport::connect(perf_address.as_str())
        .await
        .with_context(|| format!("Cannot reach performance source at {}", perf_address))?;

    let signal_flag = termination.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_flag.request(TerminationCause::Signal);
        }
    });

    if config.run.operator_console {
        let console_flag = termination.clone();
        tokio::spawn(async move {
            if let Err(e) = console::run_console(console::operator_lines(), tokio::io::stdout(), console_flag).await {
                warn!("Operator console failed: {}", e);
            }
        });
    }

    info!("Running workload {} ({})", workload.name(), workload.description());
    let session = RunSession::new(config, workload, Arc::new(factory), journal, termination);
    let report = session.run(perf).await.context("Run failed to start")?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{}", report.final_summary);
    println!();
    println!("Stopped:        {}", report.cause);
    println!("Run time:       {}", format_elapsed(report.elapsed));
    println!("Workers:        {}", report.spawned);
    if !report.drain.is_drained() {
        println!("Abandoned:      {:?}", report.drain);
    }
}

async fn relay_command(bind: &str) -> Result<()> {
    let relay = PerfRelay::bind(bind)
        .await
        .with_context(|| format!("Cannot listen on {}", bind))?;
    println!("Performance relay listening on {}", relay.local_addr()?);

    tokio::select! {
        result = relay.serve() => result.context("Performance relay failed"),
        _ = tokio::signal::ctrl_c() => {
            info!("Performance relay shutting down");
            Ok(())
        }
    }
}

async fn prepare_command(config: &DotsConfig, workload: Option<String>) -> Result<()> {
    let name = workload.unwrap_or_else(|| config.run.workload.clone());
    let workload = WorkloadRegistry::with_defaults()
        .resolve(&name)
        .context("Cannot select workload")?;

    let factory = SqlxConnectionFactory::new(&config.database).context("Invalid database settings")?;
    let mut conn = factory
        .create_connection()
        .await
        .context("Failed to connect to database")?;
    let prepared = prepare_schema(workload.as_ref(), conn.as_mut()).await;
    if let Err(e) = conn.close().await {
        warn!("Failed to close connection: {}", e);
    }
    prepared.context("Failed to create tables")?;

    println!("Tables for workload {} are ready", workload.name());
    Ok(())
}

fn workloads_command() {
    let registry = WorkloadRegistry::with_defaults();
    for workload in registry.list() {
        println!(
            "{:<10} {:<10} {}",
            workload.name(),
            workload.aliases().join(","),
            workload.description()
        );
    }
}

/// Handle configuration validation
fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    match load_config(Some(config_file)) {
        Ok(_) => {
            println!("Configuration file is valid");
            Ok(())
        }
        Err(e) => {
            println!("Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }

    fs::write(output, DotsConfig::generate_sample()).context("Failed to write configuration file")?;
    println!("Sample configuration written to {:?}", output);
    println!("Validate with: dots config validate --config-file {:?}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { config_cmd } = &cli.command {
        init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
        return match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
            ConfigCommands::Show => {
                let config = load_config(cli.config.as_ref())?;
                print!("{}", config.to_yaml()?);
                Ok(())
            }
        };
    }

    let config = load_config(cli.config.as_ref())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.as_str().to_string());
    init_simple_tracing(&level)?;

    match cli.command {
        Commands::Run {
            workload,
            duration,
            auto,
        } => run_command(config, workload, duration, auto).await,
        Commands::Relay { bind } => relay_command(&bind).await,
        Commands::Prepare { workload } => prepare_command(&config, workload).await,
        Commands::Workloads => {
            workloads_command();
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}
