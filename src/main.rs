//! # Gann Bot — command line entry point
//!
//! ```text
//! gann-bot backtest [--bars N] [--seed S] [--latency-ms MS]
//! gann-bot live --email you@example.com --password ******
//! ```
//!
//! ## Environment Variables
//!
//! | Variable      | Default                 | Description                 |
//! |---------------|-------------------------|-----------------------------|
//! | `BRIDGE_URL`  | `http://localhost:8081` | Broker bridge base URL      |
//! | `LOG_FILE`    | `gann_bot.log`          | Plain-text log copy         |
//! | `RUST_LOG`    | `gann_bot=info`         | Tracing filter              |
//!
//! See [`gann_bot::config`] for the full list.

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gann_bot::audit::TradeJournal;
use gann_bot::backtest::BacktestSimulator;
use gann_bot::broker::HttpBroker;
use gann_bot::clock::{Clock, SystemClock};
use gann_bot::config::{BacktestConfig, BotConfig};
use gann_bot::engine::{StopHandle, TradingLoop};

#[derive(Parser)]
#[command(name = "gann-bot", about = "Gann Square + Martingale trading bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Instrument, e.g. EURUSD-OTC.
    #[arg(long, global = true)]
    pair: Option<String>,

    /// Base stake.
    #[arg(long, global = true)]
    stake: Option<f64>,

    /// Martingale escalation cap.
    #[arg(long, global = true)]
    max_levels: Option<u32>,

    /// Halt once this fraction of the initial balance is lost.
    #[arg(long, global = true)]
    stop_loss: Option<f64>,

    /// Plain-text log file; pass an empty string to disable.
    #[arg(long, global = true)]
    log_file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Trade live through the broker bridge.
    Live {
        #[arg(long, env = "IQ_EMAIL")]
        email: String,

        #[arg(long, env = "IQ_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Replay a synthetic price series with simulated outcomes.
    Backtest {
        /// Number of M1 bars to generate.
        #[arg(long)]
        bars: Option<usize>,

        /// RNG seed for a reproducible run.
        #[arg(long)]
        seed: Option<u64>,

        /// Artificial per-bar latency in milliseconds.
        #[arg(long)]
        latency_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env + config ─────────────────────────────────────────────────
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = BotConfig::from_env().context("Failed to load config")?;
    if let Some(pair) = cli.pair { config.pair = pair; }
    if let Some(stake) = cli.stake { config.initial_stake = stake; }
    if let Some(levels) = cli.max_levels { config.max_escalation = levels; }
    if let Some(fraction) = cli.stop_loss { config.stop_loss_fraction = fraction; }
    if let Some(path) = cli.log_file {
        config.log_file = (!path.is_empty()).then_some(path);
    }
    config.validate()?;

    // ── 2. Structured logging ─────────────────────────────────────────────────
    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {path}"))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(
            EnvFilter::from_default_env()
                .add_directive("gann_bot=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════╗
  ║   GANN BOT — Square Levels + Martingale       ║
  ║   Levels · Signal · Stake · Breaker · Backtest║
  ╚═══════════════════════════════════════════════╝"#);

    // ── 3. Ctrl-C → graceful stop at the next cycle boundary ──────────────────
    let stop = StopHandle::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Bot stopped by user");
                stop.stop();
            }
        });
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let journal = TradeJournal::create(&config.journal_dir).context("Cannot create trade journal")?;

    match cli.command.unwrap_or(Commands::Backtest { bars: None, seed: None, latency_ms: None }) {
        // ── Live ──────────────────────────────────────────────────────────────
        Commands::Live { email, password } => {
            let broker = Arc::new(HttpBroker::new(&config, email, password, clock.clone()));
            broker
                .connect_with_retry(config.connect_attempts, config.connect_retry_delay)
                .await
                .context("Failed to connect to broker. Exiting.")?;

            let mut bot = TradingLoop::start(config, broker.clone(), broker, clock, stop)
                .await
                .context("Failed to start trading session")?
                .with_journal(journal);

            let summary = bot.run().await;
            info!(
                final_balance = summary.final_balance,
                trades        = summary.total_trades,
                "Bot stopped"
            );
        }

        // ── Backtest ──────────────────────────────────────────────────────────
        Commands::Backtest { bars, seed, latency_ms } => {
            let mut backtest = BacktestConfig::from_env().context("Failed to load backtest config")?;
            if let Some(bars) = bars { backtest.bars = bars; }
            if seed.is_some() { backtest.seed = seed; }
            if let Some(ms) = latency_ms { backtest.latency = std::time::Duration::from_millis(ms); }

            let report = BacktestSimulator::new(config, backtest, clock)
                .with_journal(journal)
                .run()
                .await?;

            println!("Backtest completed. Final balance: ${:.2}", report.final_balance);
        }
    }

    Ok(())
}
