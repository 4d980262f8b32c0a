//! Administrative CLI for pathmend.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use pathmend_core::config::AppConfig;
use pathmend_repair::{RepairReport, Repairer, TracingOutput};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pathmendctl")]
#[command(about = "Repair path and parent inconsistencies in a namespace entry table")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "PATHMEND_CONFIG",
        default_value = "config/pathmend.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ScopeArgs {
    /// Only consider entries on this storage (or whose parent is on it)
    #[arg(long)]
    storage: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair mismatched paths and unresolvable parents
    Repair {
        /// Count inconsistencies without modifying anything
        #[arg(long)]
        dry_run: bool,

        /// Rows fetched per round
        #[arg(long)]
        chunk_size: Option<u32>,

        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Count inconsistencies; exits with status 2 when any are found
    Check {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(report) if report.has_warnings() => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "Repair failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<RepairReport> {
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Repair {
            dry_run,
            chunk_size,
            scope,
        } => {
            config.repair.dry_run |= dry_run;
            if let Some(chunk_size) = chunk_size {
                config.repair.chunk_size = chunk_size;
            }
            if scope.storage.is_some() {
                config.repair.storage_id = scope.storage;
            }
        }
        Commands::Check { scope } => {
            config.repair.dry_run = true;
            if scope.storage.is_some() {
                config.repair.storage_id = scope.storage;
            }
        }
    }

    config.validate().context("invalid configuration")?;

    let store = pathmend_metadata::from_config(&config.store)
        .await
        .context("failed to open entry store")?;
    store
        .health_check()
        .await
        .context("entry store health check failed")?;

    let mut out = TracingOutput::new();
    let report = Repairer::new(&*store, config.repair)
        .run(&mut out)
        .await
        .context("repair aborted")?;

    let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    println!("{json}");

    Ok(report)
}

/// Load configuration from the optional TOML file, then `PATHMEND_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    figment
        .merge(Env::prefixed("PATHMEND_").split("__"))
        .extract()
        .context("failed to load configuration")
}
