//! Gameplay agent entry point.
//!
//! ```text
//! screen --> Monitor --> DecisionEngine --> model
//!                              |
//!                              v
//!                      ActionDispatcher --> keyboard
//! ```
//!
//! One decision per interval until Ctrl-C or `--max-cycles`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use coh_core::config::BotConfig;
use coh_core::input::{native_input, DryRunInput, InputDevice};
use coh_core::{
    ActionDispatcher, DecisionEngine, GameStateMonitor, GameplayBot, NovaClient, Resolution,
    ScreenCapture, SessionLog,
};

/// Screen-aware City of Heroes gameplay agent
#[derive(Parser)]
#[command(name = "coh-bot")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Seconds between decision cycles (overrides DECISION_INTERVAL)
    #[arg(long)]
    interval: Option<f64>,

    /// Screen resolution as WIDTHxHEIGHT (overrides SCREEN_RESOLUTION)
    #[arg(long, value_parser = parse_resolution)]
    resolution: Option<Resolution>,

    /// Directory for session and trace logs (overrides COH_LOG_DIR)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Stop after this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Log key events instead of sending them
    #[arg(long)]
    dry_run: bool,
}

fn parse_resolution(raw: &str) -> std::result::Result<Resolution, String> {
    Resolution::parse(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = BotConfig::from_env().context("failed to load configuration")?;
    if let Some(seconds) = cli.interval {
        anyhow::ensure!(
            seconds.is_finite() && seconds > 0.0,
            "--interval must be positive, got {seconds}"
        );
        config.decision_interval = std::time::Duration::from_secs_f64(seconds);
    }
    if let Some(resolution) = cli.resolution {
        config.resolution = Some(resolution);
    }
    if let Some(dir) = cli.log_dir {
        config.log_dir = dir;
    }

    let _guard = setup_logging(&config.log_dir)?;
    info!(
        region = config.inference.region,
        model = config.inference.model_id,
        interval_ms = config.decision_interval.as_millis() as u64,
        resolution = ?config.resolution,
        dry_run = cli.dry_run,
        "configuration loaded"
    );

    let mut monitor = GameStateMonitor::new(ScreenCapture::new());
    if let Some(resolution) = config.resolution {
        monitor.calibrate(resolution)?;
    }

    let client = NovaClient::new(&config.inference)?;
    info!(backend = "bedrock-nova", url = client.invoke_url(), "inference backend configured");
    let engine = DecisionEngine::new(Box::new(client));

    let input: std::sync::Arc<dyn InputDevice> = if cli.dry_run {
        std::sync::Arc::new(DryRunInput::new())
    } else {
        native_input()?
    };
    let dispatcher =
        ActionDispatcher::new(input).with_chain_interrupt(config.chain_interrupt_on_low_health);

    let log = SessionLog::create(&config.log_dir)?;
    let bot = GameplayBot::new(monitor, engine, dispatcher, log, config.decision_interval)
        .with_max_cycles(cli.max_cycles);

    let summary = bot
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    println!(
        "Session ended ({:?}): {} actions, {} successful, log at {}",
        summary.stop,
        summary.cycles,
        summary.successful,
        summary.log_path.display()
    );
    Ok(())
}

/// Log to stderr and to `<log_dir>/coh-bot.log`.
fn setup_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "coh-bot.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    info!(log_file = %log_dir.join("coh-bot.log").display(), "logging initialized");
    Ok(guard)
}
