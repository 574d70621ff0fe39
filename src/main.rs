use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use quorum::config::AppConfig;
use quorum::execution::PaperVenue;
use quorum::feed::SyntheticFeed;
use quorum::orchestrator::{Orchestrator, SystemEvent};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

mod main_runtime;

#[derive(Parser)]
#[command(name = "quorum")]
#[command(version)]
#[command(about = "Multi-agent signal coordination with a risk-gated paper venue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding default.toml and <QUORUM_ENV>.toml
    #[arg(short, long, default_value = "config", env = "QUORUM_CONFIG_DIR")]
    config_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run agents against the synthetic feed and the paper venue
    Run {
        /// Stop after this many seconds (runs until Ctrl+C when unset)
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },
    /// Load and validate the configuration
    CheckConfig,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("failed to load config from {}", cli.config_dir))?;

    match cli.command.unwrap_or(Commands::Run {
        duration_secs: None,
    }) {
        Commands::CheckConfig => {
            main_runtime::init_logging_simple();
            match config.validate() {
                Ok(()) => println!("configuration OK ({} agents)", config.agents.len()),
                Err(errors) => {
                    for e in &errors {
                        println!("✗ {e}");
                    }
                    return Err(anyhow!("{} configuration error(s)", errors.len()));
                }
            }
        }
        Commands::PrintConfig => {
            main_runtime::init_logging_simple();
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Run { duration_secs } => {
            main_runtime::init_logging(&config.logging);
            run(config, duration_secs).await?;
        }
    }

    Ok(())
}

async fn run(config: AppConfig, duration_secs: Option<u64>) -> anyhow::Result<()> {
    if let Err(errors) = config.validate() {
        return Err(anyhow!("invalid configuration: {}", errors.join("; ")));
    }

    let venue = Arc::new(PaperVenue::new(config.venue.clone()));
    let orchestrator = Orchestrator::from_app_config(&config, venue)?;
    let (handle, join) = orchestrator.spawn()?;

    let mut events = handle.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SystemEvent::TradeExecuted(record)) => info!(
                    trade_id = %record.id,
                    symbol = %record.symbol,
                    action = %record.action,
                    amount = %record.amount,
                    "trade executed"
                ),
                Ok(SystemEvent::Halted { reason }) => warn!(%reason, "trading halted"),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut feed = SyntheticFeed::new(config.feed.clone());
    let mut feed_tick = interval(Duration::from_millis(feed.interval_ms()));
    feed_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let shutdown = main_runtime::shutdown_signal();
    tokio::pin!(shutdown);

    info!(symbols = config.feed.symbols.len(), "feed started");

    'feed: loop {
        tokio::select! {
            _ = feed_tick.tick() => {
                for tick in feed.next_ticks(Utc::now()) {
                    if let Err(e) = handle.publish_market_data(tick).await {
                        error!(error = %e, "orchestrator stopped unexpectedly");
                        break 'feed;
                    }
                }
            }
            _ = &mut deadline => {
                info!("run duration elapsed");
                break 'feed;
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break 'feed;
            }
        }
    }

    let health = handle.system_health().await.ok();
    if let Err(e) = handle.stop().await {
        warn!(error = %e, "orchestrator already stopped");
    }
    drop(handle);
    if let Err(e) = join.await {
        error!(error = %e, "orchestrator task failed");
    }
    event_logger.abort();

    if let Some(health) = health {
        println!("{}", serde_json::to_string_pretty(&health)?);
    }
    info!("Shutdown complete");
    Ok(())
}
