//! # backtest
//!
//! **Backtest Simulator** — replays a synthetic bar series through the same
//! [`Session`] decision core the live loop uses.
//!
//! ## How it works
//! 1. Generate a random-walk M1 series (one week by default).
//! 2. Slide a window of `bars_per_cycle` bars across it, one bar per step.
//! 3. Each step runs evaluate → prepare_trade → execute → record.
//! 4. Trades resolve through [`SimulatedExecutor`]: a fixed win probability
//!    and payout, independent of the price path.
//! 5. Stop early when the circuit breaker halts.
//!
//! Returns final balance, total P/L, win rate and trade count.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::TradeJournal;
use crate::clock::Clock;
use crate::config::{BacktestConfig, BotConfig};
use crate::engine::executor::{SimulatedExecutor, TradeExecutor};
use crate::engine::session::{Evaluation, Session};
use crate::error::{BotError, Result};
use crate::models::{Bar, TradeRecord};
use crate::risk::HaltReason;

// ─── Report ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub initial_balance: f64,
    pub final_balance:   f64,
    pub total_profit:    f64,
    /// Fraction in `[0, 1]`.
    pub win_rate:        f64,
    pub total_trades:    usize,
    /// Bars stepped through before finishing or halting.
    pub bars_processed:  usize,
    pub halted:          Option<HaltReason>,
    pub trades:          Vec<TradeRecord>,
}

impl BacktestReport {
    pub fn log(&self) {
        info!("📊 Backtest Results:");
        info!("   Initial Balance:   ${:.2}", self.initial_balance);
        info!("   Final Balance:     ${:.2}", self.final_balance);
        info!("   Total Profit/Loss: ${:.2}", self.total_profit);
        info!("   Win Rate:          {:.2}%", self.win_rate * 100.0);
        info!("   Total Trades:      {}", self.total_trades);
        if let Some(reason) = self.halted {
            info!("   Stopped early:     {reason}");
        }
    }
}

// ─── Synthetic Series ─────────────────────────────────────────────────────────

/// Gaussian random walk, one bar per minute, ending at `end`.
///
/// `open == close == price`, `high/low = price ± |move|`, volume uniform in
/// `[volume_min, volume_max)`.
pub fn synthetic_series(cfg: &BacktestConfig, end: DateTime<Utc>, rng: &mut StdRng) -> Result<Vec<Bar>> {
    if cfg.volume_max <= cfg.volume_min {
        return Err(BotError::Config(format!(
            "volume range is empty: [{}, {})",
            cfg.volume_min, cfg.volume_max
        )));
    }
    let step = Normal::new(0.0, cfg.volatility)
        .map_err(|e| BotError::Config(format!("invalid volatility {}: {e}", cfg.volatility)))?;

    let start = end - ChronoDuration::minutes(cfg.bars as i64);
    let mut price = cfg.start_price;
    let mut bars = Vec::with_capacity(cfg.bars);

    for i in 0..cfg.bars {
        let movement: f64 = step.sample(rng);
        price += movement;

        bars.push(Bar {
            time:   start + ChronoDuration::minutes(i as i64),
            open:   price,
            high:   price + movement.abs(),
            low:    price - movement.abs(),
            close:  price,
            volume: f64::from(rng.gen_range(cfg.volume_min..cfg.volume_max)),
        });
    }

    Ok(bars)
}

// ─── Simulator ────────────────────────────────────────────────────────────────

pub struct BacktestSimulator {
    config:   BotConfig,
    backtest: BacktestConfig,
    clock:    Arc<dyn Clock>,
    journal:  Option<TradeJournal>,
}

impl BacktestSimulator {
    pub fn new(config: BotConfig, backtest: BacktestConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, backtest, clock, journal: None }
    }

    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Generates a fresh series and runs it against the stochastic executor.
    pub async fn run(&mut self) -> Result<BacktestReport> {
        let mut rng = match self.backtest.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            bars  = self.backtest.bars,
            start = self.backtest.start_price,
            seed  = ?self.backtest.seed,
            "📂 Generating synthetic history for backtesting..."
        );
        let bars = synthetic_series(&self.backtest, self.clock.now(), &mut rng)?;

        let executor = SimulatedExecutor::new(
            self.backtest.win_probability,
            self.backtest.payout_ratio,
            self.backtest.start_balance,
            Some(rng.gen()),
        );

        self.run_on(&bars, &executor).await
    }

    /// Steps through `bars` with any executor.
    pub async fn run_on(&mut self, bars: &[Bar], executor: &dyn TradeExecutor) -> Result<BacktestReport> {
        info!("▶️ Running backtest with Gann Square + Martingale strategy...");

        let window_len = self.config.bars_per_cycle.max(1);
        let initial_balance = executor.balance().await?;
        let mut session = Session::new(&self.config, initial_balance);
        let mut bars_processed = 0;

        for i in 0..bars.len().saturating_sub(window_len) {
            if !self.backtest.latency.is_zero() {
                self.clock.sleep(self.backtest.latency).await;
            }
            bars_processed += 1;

            let window = &bars[i..i + window_len];
            let entry = match session.evaluate(window) {
                Ok(Evaluation::Entry(entry)) => entry,
                Ok(_) => continue,
                Err(e) => {
                    warn!(bar = i, error = %e, "Skipping bar");
                    continue;
                }
            };

            let ticket = match session.prepare_trade() {
                Ok(ticket) => ticket,
                Err(_) => break,
            };

            let outcome = match executor.execute(&self.config.pair, entry.direction, ticket.stake).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_precondition() => continue,
                Err(e) => {
                    warn!(bar = i, error = %e, "Simulated execution failed");
                    continue;
                }
            };

            let (record, halt) = session.record(&entry, ticket, outcome);
            if let Some(journal) = self.journal.as_mut() {
                journal.append(&record)?;
            }
            if halt.is_some() {
                info!("Stop condition reached during backtest");
                break;
            }
        }

        let summary = session.summary();
        debug!(
            levels_cached = summary.levels_cached,
            cache_hits    = summary.level_cache_hits,
            "Level cache usage"
        );
        let report = BacktestReport {
            initial_balance: summary.initial_balance,
            final_balance:   summary.final_balance,
            total_profit:    summary.total_profit,
            win_rate:        summary.win_rate,
            total_trades:    summary.total_trades,
            bars_processed,
            halted:          summary.halted,
            trades:          session.history().to_vec(),
        };
        report.log();
        Ok(report)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
