//! replica-reload - Leader-Aware Table Reloads for MariaDB Replica Sets
//!
//! Fetches an inventory dataset and swaps it into the writable member of
//! the replica set. Meant to be started by a scheduler; the exit code is
//! the only thing the scheduler sees.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use replica_reload::archive::PayloadArchive;
use replica_reload::config::ReloadConfig;
use replica_reload::connection::ConnectionManager;
use replica_reload::discovery::{LeaderDiscovery, LeaderState};
use replica_reload::error::{Error, Result};
use replica_reload::executor::{MariaDbConnector, ReloadConnection};
use replica_reload::orchestrator::{RetryOrchestrator, RunReport};
use replica_reload::reload::{ReloadStep, TableSchema};
use replica_reload::upstream::HttpDatasetSource;

/// Exit code for configuration and usage errors
const EXIT_USAGE: u8 = 2;

/// replica-reload - Leader-Aware Table Reloads for MariaDB Replica Sets
#[derive(Parser)]
#[command(name = "replica-reload")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "replica-reload.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reload one table from the upstream service
    Run {
        /// Table to reload
        #[arg(short, long, value_enum, ignore_case = true)]
        table: TableArg,
    },

    /// Discover the current leader and print its status as JSON
    Leader,

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "replica-reload.toml")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TableArg {
    #[value(name = "link_master")]
    LinkMaster,
    #[value(name = "router_master")]
    RouterMaster,
}

impl TableArg {
    fn schema(self) -> TableSchema {
        match self {
            TableArg::LinkMaster => TableSchema::LINK_MASTER,
            TableArg::RouterMaster => TableSchema::ROUTER_MASTER,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { table } => {
            let Some(config) = load_config(&cli.config, cli.log_level.as_deref()) else {
                return ExitCode::from(EXIT_USAGE);
            };
            run_reload(config, table.schema()).await
        }
        Commands::Leader => {
            let Some(config) = load_config(&cli.config, cli.log_level.as_deref()) else {
                return ExitCode::from(EXIT_USAGE);
            };
            match run_leader(config).await {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!("Leader status failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            run_validate(&cli.config)
        }
        Commands::Init { output } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            match run_init(&output) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!("Failed to write {}: {}", output.display(), e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Initialize logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load the configuration and start logging at the level it asks for
fn load_config(path: &Path, cli_level: Option<&str>) -> Option<ReloadConfig> {
    match ReloadConfig::from_file(path) {
        Ok(config) => {
            init_logging(cli_level.unwrap_or(&config.logging.level));
            Some(config)
        }
        Err(e) => {
            init_logging(cli_level.unwrap_or("info"));
            tracing::error!("Failed to load configuration from {:?}: {}", path, e);
            None
        }
    }
}

/// Run one reload and map the report to an exit code
async fn run_reload(config: ReloadConfig, table: TableSchema) -> ExitCode {
    let span = tracing::info_span!("reload", run_id = %Uuid::new_v4(), table = table.name);

    match reload(config, table).instrument(span).await {
        Ok(report) => {
            for failure in &report.failures {
                tracing::debug!(
                    "attempt {} failed at {} on {}: {}",
                    failure.attempt,
                    failure.step,
                    failure.host.as_deref().unwrap_or("-"),
                    failure.message
                );
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) if e.step() == ReloadStep::Setup => {
            tracing::error!("Reload setup failed: {}", e);
            ExitCode::from(EXIT_USAGE)
        }
        Err(e) => {
            tracing::error!("Reload could not start: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn reload(config: ReloadConfig, table: TableSchema) -> Result<RunReport> {
    tracing::info!("Starting reload of {}", table);

    let source = HttpDatasetSource::new(config.upstream.clone())?;
    let discovery = LeaderDiscovery::from_config(&config)?;
    let connector = MariaDbConnector::new(config.database.clone(), config.reload.insert_batch_size);
    let mut connections = ConnectionManager::new(discovery, connector);

    let mut orchestrator = RetryOrchestrator::new(&mut connections).dry_run(config.reload.dry_run);
    if let Some(dir) = &config.reload.archive_dir {
        orchestrator = orchestrator.with_archive(PayloadArchive::new(
            dir.clone(),
            config.upstream.source_name.clone(),
        ));
    }

    Ok(orchestrator.run(&source, &table, &config.retry_policy()).await)
}

#[derive(Serialize)]
struct LeaderStatus {
    mode: &'static str,
    members: Vec<String>,
    state: LeaderState,
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Discover the leader, ping it and print the result
async fn run_leader(config: ReloadConfig) -> Result<ExitCode> {
    let discovery = LeaderDiscovery::from_config(&config)?;
    let connector = MariaDbConnector::new(config.database.clone(), config.reload.insert_batch_size);
    let mut connections = ConnectionManager::new(discovery, connector);

    let error = match connections.acquire().await {
        Ok(conn) => conn.ping().await.err(),
        Err(e) => Some(e),
    };

    let status = LeaderStatus {
        mode: if config.fabric.enabled { "fabric" } else { "direct" },
        members: config.registry().members().iter().map(|m| m.to_string()).collect(),
        state: connections.leader_state().clone(),
        reachable: error.is_none(),
        error: error.map(|e| e.to_string()),
    };

    let json = serde_json::to_string_pretty(&status)
        .map_err(|e| Error::Internal(format!("Failed to encode status: {}", e)))?;
    println!("{}", json);

    Ok(if status.reachable {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Validate configuration
fn run_validate(config_path: &Path) -> ExitCode {
    match ReloadConfig::from_file(config_path) {
        Ok(config) => {
            let registry = config.registry();
            println!("✓ Configuration is valid");
            match registry.fabric() {
                Some(group) => println!(
                    "  Discovery: fabric {} (group {})",
                    group.coordinator_address, group.group_id
                ),
                None => println!("  Discovery: direct probe"),
            }
            for member in registry.members() {
                println!("  Member: {}", member);
            }
            println!("  Upstream: {}:{}", config.upstream.host, config.upstream.port);
            println!(
                "  Retry: {} attempts, {}ms apart",
                config.retry.max_attempts, config.retry.wait_ms
            );
            if config.reload.dry_run {
                println!("  Dry run: database writes disabled");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("✗ Configuration is invalid: {}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Write a sample configuration file
fn run_init(output: &Path) -> Result<()> {
    std::fs::write(output, ReloadConfig::sample())?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your replica set and upstream service.");
    println!(
        "Then reload with: replica-reload --config {} run --table router_master",
        output.display()
    );
    Ok(())
}
