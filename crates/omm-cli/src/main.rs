mod logging;

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use omm_sync::config::{parse_games, secrets_present};
use omm_sync::{FailureSummary, SyncConfig};
use tracing::{error, info};

use crate::logging::{init_logging, LogConfig};

#[derive(Debug, Parser)]
#[command(name = "omm")]
#[command(about = "Mirror ongoing FACEIT tournament matches into Supabase")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one time-budgeted sync pass.
    Sync(SyncArgs),
    /// Validate configuration and exit without contacting any service.
    CheckConfig,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    /// Merge rows into memory instead of writing to the table.
    #[arg(long)]
    dry_run: bool,
    /// Comma-separated game ids overriding OMM_GAMES.
    #[arg(long, value_delimiter = ',')]
    games: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let started = Instant::now();
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_config = match LogConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid logging configuration: {err:#}");
            LogConfig::default()
        }
    };
    if let Err(err) = init_logging(&log_config) {
        eprintln!("logging setup failed: {err:#}");
    }

    let outcome = match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => sync(args).await,
        Commands::CheckConfig => check_config(),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "sync failed");
            let failure = FailureSummary::new(&err, started.elapsed());
            match serde_json::to_string_pretty(&failure) {
                Ok(json) => println!("{json}"),
                Err(ser) => error!(error = %ser, "failed to render failure summary"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn sync(args: SyncArgs) -> Result<()> {
    let mut config = load_config()?;
    if !args.games.is_empty() {
        config.pipeline.games =
            parse_games(&args.games.join(",")).context("--games needs at least one game id")?;
    }

    let outcome = omm_sync::run_from_config(&config, args.dry_run).await?;
    if let Some(rows) = outcome.dry_run_rows {
        info!(rows, "dry run complete; nothing written");
    }
    let json = serde_json::to_string_pretty(&outcome.summary).context("rendering run summary")?;
    println!("{json}");
    Ok(())
}

fn check_config() -> Result<()> {
    let config = load_config()?;
    info!(
        games = %config.pipeline.games.join(", "),
        budget_ms = config.pipeline.hard_timeout.as_millis() as u64,
        batch_size = config.pipeline.upsert_batch_size,
        "configuration ok"
    );
    Ok(())
}

fn load_config() -> Result<SyncConfig> {
    for (name, loaded) in secrets_present(|name| std::env::var(name).ok()) {
        info!(variable = name, loaded, "secret presence");
    }
    let config = SyncConfig::from_env().context("loading configuration")?;
    info!(supabase_url = %config.supabase_url, "environment loaded");
    Ok(config)
}
