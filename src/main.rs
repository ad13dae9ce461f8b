mod config;
mod control;
mod error;
mod exchange;
mod indicators;
mod ledger;
mod notifications;
mod position_manager;
mod regime;
#[cfg(test)]
mod scenarios;
mod scheduler;
mod signal;
mod sizing;
mod types;
mod votes;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{RuntimeConfig, RuntimeConfigManager};
use control::{CliCommand, ControlSurface, SchedulerControlSurface};
use exchange::{BinanceClient, Exchange};
use ledger::PortfolioLedger;
use notifications::{NotificationManager, NotificationSink};
use scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "regime-trading-engine")]
#[command(author = "Trading Bot")]
#[command(version = "0.1.0")]
#[command(about = "Regime-adaptive signal-and-portfolio engine for spot crypto trading", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite ledger path
    #[arg(long, default_value = "sqlite://./trading_bot.db")]
    db_path: String,

    /// Optional TOML file of config overrides, layered over the built-in
    /// defaults and under any `ENGINE__`-prefixed environment variable
    #[arg(long)]
    config: Option<String>,

    /// Binance API key (live trading only)
    #[arg(long, env = "BINANCE_API_KEY", default_value = "")]
    api_key: String,

    /// Binance secret key (live trading only)
    #[arg(long, env = "BINANCE_SECRET_KEY", default_value = "")]
    secret_key: String,

    /// Use Binance testnet instead of the public Binance.US endpoint
    #[arg(long)]
    testnet: bool,

    /// Identifier allowed to issue control commands against a running instance
    #[arg(long, env = "ENGINE_OWNER_ID", default_value = "owner")]
    owner_id: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler: spawns one worker per tracked symbol and polls
    /// indefinitely until Ctrl+C.
    Run,
    /// Issue a single control command against the ledger and exit. Useful
    /// for scripting the same commands a chat backend would send.
    #[command(subcommand)]
    Control(CliCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ledger = Arc::new(PortfolioLedger::new(&cli.db_path).await?);

    let mut runtime_config = RuntimeConfig::load(cli.config.as_deref())?;
    runtime_config.general.owner_id = cli.owner_id.clone();
    if let Err(errors) = runtime_config.validate() {
        return Err(anyhow!(errors.join(", ")));
    }
    let config_manager = RuntimeConfigManager::new(runtime_config);

    let exchange: Arc<dyn Exchange> = if cli.api_key.is_empty() {
        Arc::new(BinanceClient::public_only())
    } else {
        Arc::new(BinanceClient::new(cli.api_key.clone(), cli.secret_key.clone(), cli.testnet))
    };

    let notifier: Arc<dyn NotificationSink> = Arc::new(NotificationManager::new());
    let scheduler = Arc::new(Scheduler::new(exchange, Arc::clone(&ledger), config_manager, notifier));

    match cli.command {
        Commands::Run => {
            info!("starting scheduler");
            run_until_shutdown(scheduler).await?;
        }
        Commands::Control(command) => {
            let surface = SchedulerControlSurface::new(Arc::clone(&scheduler), cli.owner_id.clone());
            let reply = surface
                .dispatch(&cli.owner_id, command)
                .await
                .map_err(|e| anyhow!(e.to_string()))?;
            println!("{reply}");
        }
    }

    Ok(())
}

async fn run_until_shutdown(scheduler: Arc<Scheduler>) -> Result<()> {
    let run_handle = tokio::spawn(Arc::clone(&scheduler).run());

    tokio::select! {
        result = run_handle => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            scheduler.controller().stop().ok();
        }
    }

    Ok(())
}
