//! Envelope Bot - one trading cycle per invocation

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use envelope_bot::adapters::cli::{self, Command, OutputFormat, ResetTrackerCmd, StatusCmd};
use envelope_bot::adapters::kucoin::{KucoinClient, KucoinConfig};
use envelope_bot::application::{RunController, RunOutcome, RunSettings};
use envelope_bot::config::{load_config, Config, Credentials};
use envelope_bot::domain::TrackerStore;
use envelope_bot::strategy::EnvelopeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (API credentials go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();
    let config = load_config(app.command.config_path())
        .with_context(|| format!("Failed to load configuration from {}", app.command.config_path().display()))?;
    init_logging(app.verbose, app.debug, config.logging.level.as_deref())?;

    match app.command {
        Command::Run(_) => run_command(&config).await,
        Command::Status(cmd) => status_command(&config, cmd),
        Command::ResetTracker(cmd) => reset_tracker_command(&config, cmd),
    }
}

/// Flags win over the config file, which wins over `RUST_LOG`
fn init_logging(verbose: bool, debug: bool, level: Option<&str>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else if let Some(level) = level {
        EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{}'", level))?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run_command(config: &Config) -> Result<()> {
    let credentials = Credentials::from_env().context("Missing KuCoin API credentials")?;
    let kucoin_config =
        KucoinConfig::from(&config.exchange).with_margin(config.market.margin_mode, config.market.leverage);
    let client = KucoinClient::new(kucoin_config, credentials)
        .context("Failed to create KuCoin client")?;

    if config.exchange.sandbox {
        tracing::warn!("SANDBOX MODE - orders go to the KuCoin futures sandbox");
    }

    let store = TrackerStore::new(config.tracker_path());
    let mut controller = RunController::new(
        RunSettings::from(config),
        EnvelopeConfig::from(config),
        Arc::new(client),
        store,
    );

    let outcome = controller.run().await.context("Run failed")?;
    match outcome {
        RunOutcome::Completed(report) => tracing::info!(
            "Cycle complete: {} placed, {} failed, {} levels skipped",
            report.placed,
            report.failed,
            report.skipped_levels
        ),
        RunOutcome::ResumeBlocked => tracing::info!("Cycle complete: entries still paused"),
        RunOutcome::KillSwitchFired => tracing::warn!("Cycle complete: position closed by price-jump kill switch"),
    }
    Ok(())
}

fn status_command(config: &Config, cmd: StatusCmd) -> Result<()> {
    let store = TrackerStore::new(config.tracker_path());
    if !store.path().exists() {
        println!("No tracker yet at {} (first run will create it)", store.path().display());
        return Ok(());
    }

    let state = store.load().context("Failed to load tracker")?;
    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        OutputFormat::Text => {
            println!("Symbol:          {}", config.market.symbol);
            println!("Tracker:         {}", store.path().display());
            println!("Status:          {}", state.status.as_str());
            match state.last_side {
                Some(side) => println!("Last side:       {}", side),
                None => println!("Last side:       -"),
            }
            println!("Stop losses:     {}", state.stop_loss_ids.len());
            for id in &state.stop_loss_ids {
                println!("  - {}", id);
            }
            if let Some(price) = state.stop_loss_price {
                println!("Stop loss price: {:.4}", price);
            }
        }
    }
    Ok(())
}

fn reset_tracker_command(config: &Config, cmd: ResetTrackerCmd) -> Result<()> {
    let store = TrackerStore::new(config.tracker_path());
    if !cmd.yes {
        bail!(
            "Refusing to reset {} without --yes.\n\
             A reset re-enables trading on the next run regardless of price.",
            store.path().display()
        );
    }
    store.reset().context("Failed to reset tracker")?;
    println!("Tracker reset: {}", store.path().display());
    Ok(())
}
