//! # config — Session configuration from environment variables
//!
//! | Variable                 | Default        | Description                         |
//! |--------------------------|----------------|-------------------------------------|
//! | `PAIR`                   | `EURUSD-OTC`   | Instrument                          |
//! | `TIMEFRAME`              | `M1`           | Bar granularity                     |
//! | `INITIAL_STAKE`          | `1.0`          | Base stake                          |
//! | `MAX_MARTINGALE_LEVELS`  | `2`            | Escalation cap                      |
//! | `STOP_LOSS_FRACTION`     | `0.05`         | Halt at 5 % loss of initial balance |
//! | `SPREAD_LIMIT_PIPS`      | `2.0`          | Skip trade above this spread        |
//! | `EXPIRY_SECS`            | `60`           | Option expiry                       |
//! | `BRIDGE_URL`             | `http://localhost:8081` | Broker bridge              |
//! | `SETTLE_ATTEMPTS`        | `5`            | Result polls before booking a loss  |
//! | `BACKTEST_SEED`          | unset          | RNG seed; invalid values are errors |
//!
//! Values are read once; the core treats them as read-only for the session.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::engine::levels::DEFAULT_CACHE_CAPACITY;

/// Volume must exceed this multiple of the trailing average.
pub const VOLUME_CONFIRMATION: f64 = 2.0;

// ─── Bot Config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub pair:                 String,
    /// `M1`, `M5`, `H1`, ...
    pub timeframe:            String,
    pub initial_stake:        f64,
    pub max_escalation:       u32,
    pub stop_loss_fraction:   f64,
    /// Maximum spread in pips before a trade is skipped.
    pub spread_limit:         f64,
    /// Price units → pips (10 000 for EURUSD).
    pub pip_factor:           f64,
    pub volume_threshold:     f64,
    pub volume_lookback:      usize,
    /// Bars fetched per cycle.
    pub bars_per_cycle:       usize,
    pub expiry:               Duration,
    /// Wait past the bar boundary before polling again.
    pub bar_buffer:           Duration,
    pub idle_delay:           Duration,
    pub error_backoff:        Duration,
    pub level_cache_capacity: usize,

    // ── Broker bridge ─────────────────────────────────────────────────────────
    pub bridge_url:           String,
    /// `PRACTICE` or `REAL`.
    pub account_mode:         String,
    pub connect_attempts:     u32,
    pub connect_retry_delay:  Duration,
    /// Result polls after expiry before a placed order is booked as a loss.
    pub settle_attempts:      u32,
    pub settle_retry_delay:   Duration,

    // ── Logging ───────────────────────────────────────────────────────────────
    /// `None` disables the file layer.
    pub log_file:             Option<String>,
    /// Directory for the CSV trade journal.
    pub journal_dir:          String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            pair:                 "EURUSD-OTC".to_string(),
            timeframe:            "M1".to_string(),
            initial_stake:        1.0,
            max_escalation:       2,
            stop_loss_fraction:   0.05,
            spread_limit:         2.0,
            pip_factor:           10_000.0,
            volume_threshold:     VOLUME_CONFIRMATION,
            volume_lookback:      5,
            bars_per_cycle:       10,
            expiry:               Duration::from_secs(60),
            bar_buffer:           Duration::from_millis(500),
            idle_delay:           Duration::from_millis(100),
            error_backoff:        Duration::from_secs(1),
            level_cache_capacity: DEFAULT_CACHE_CAPACITY,
            bridge_url:           "http://localhost:8081".to_string(),
            account_mode:         "PRACTICE".to_string(),
            connect_attempts:     3,
            connect_retry_delay:  Duration::from_millis(100),
            settle_attempts:      5,
            settle_retry_delay:   Duration::from_secs(2),
            log_file:             Some("gann_bot.log".to_string()),
            journal_dir:          ".".to_string(),
        }
    }
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();

        let log_file = std::env::var("LOG_FILE").unwrap_or_else(|_| "gann_bot.log".to_string());

        let config = Self {
            pair:                 std::env::var("PAIR").unwrap_or(d.pair),
            timeframe:            std::env::var("TIMEFRAME").unwrap_or(d.timeframe),
            initial_stake:        env_or("INITIAL_STAKE", d.initial_stake)?,
            max_escalation:       env_or("MAX_MARTINGALE_LEVELS", d.max_escalation)?,
            stop_loss_fraction:   env_or("STOP_LOSS_FRACTION", d.stop_loss_fraction)?,
            spread_limit:         env_or("SPREAD_LIMIT_PIPS", d.spread_limit)?,
            pip_factor:           env_or("PIP_FACTOR", d.pip_factor)?,
            volume_threshold:     d.volume_threshold,
            volume_lookback:      env_or("VOLUME_LOOKBACK", d.volume_lookback)?,
            bars_per_cycle:       env_or("BARS_PER_CYCLE", d.bars_per_cycle)?,
            expiry:               Duration::from_secs(env_or("EXPIRY_SECS", 60u64)?),
            bar_buffer:           Duration::from_millis(env_or("BAR_BUFFER_MS", 500u64)?),
            idle_delay:           d.idle_delay,
            error_backoff:        d.error_backoff,
            level_cache_capacity: env_or("LEVEL_CACHE_CAPACITY", d.level_cache_capacity)?,
            bridge_url:           std::env::var("BRIDGE_URL").unwrap_or(d.bridge_url),
            account_mode:         std::env::var("ACCOUNT_MODE").unwrap_or(d.account_mode),
            connect_attempts:     env_or("CONNECT_ATTEMPTS", d.connect_attempts)?,
            connect_retry_delay:  Duration::from_millis(env_or("CONNECT_RETRY_MS", 100u64)?),
            settle_attempts:      env_or("SETTLE_ATTEMPTS", d.settle_attempts)?,
            settle_retry_delay:   Duration::from_millis(env_or("SETTLE_RETRY_MS", 2_000u64)?),
            log_file:             (!log_file.is_empty()).then_some(log_file),
            journal_dir:          std::env::var("JOURNAL_DIR").unwrap_or(d.journal_dir),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.initial_stake.is_finite() && self.initial_stake > 0.0) {
            bail!("initial stake must be positive, got {}", self.initial_stake);
        }
        if self.stop_loss_fraction.is_nan() || self.stop_loss_fraction < 0.0 {
            bail!("stop-loss fraction must be >= 0, got {}", self.stop_loss_fraction);
        }
        if self.volume_lookback == 0 {
            bail!("volume lookback must be at least one bar");
        }
        if self.bars_per_cycle == 0 {
            bail!("bars per cycle must be at least one");
        }
        self.timeframe_secs()?;
        Ok(())
    }

    /// Parses `M1` / `M15` / `H1` / `D1` into seconds.
    pub fn timeframe_secs(&self) -> anyhow::Result<u64> {
        parse_timeframe(&self.timeframe)
    }
}

pub fn parse_timeframe(timeframe: &str) -> anyhow::Result<u64> {
    let tf = timeframe.trim().to_uppercase();
    let mut chars = tf.chars();
    let unit = chars.next();
    let count: u64 = chars
        .as_str()
        .parse()
        .with_context(|| format!("invalid timeframe '{timeframe}'"))?;

    let unit_secs = match unit {
        Some('S') => 1,
        Some('M') => 60,
        Some('H') => 3600,
        Some('D') => 86_400,
        _ => bail!("unknown timeframe unit in '{timeframe}'"),
    };
    if count == 0 {
        bail!("timeframe '{timeframe}' must be non-zero");
    }
    Ok(unit_secs * count)
}

// ─── Backtest Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// One week of M1 bars by default.
    pub bars:            usize,
    pub start_price:     f64,
    /// Standard deviation of the per-bar price move.
    pub volatility:      f64,
    pub volume_min:      u32,
    pub volume_max:      u32,
    pub win_probability: f64,
    pub payout_ratio:    f64,
    pub start_balance:   f64,
    /// Artificial per-cycle delay emulating network latency.
    pub latency:         Duration,
    pub seed:            Option<u64>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            bars:            7 * 24 * 60,
            start_price:     1.0800,
            volatility:      0.0005,
            volume_min:      100,
            volume_max:      1000,
            win_probability: 0.6,
            payout_ratio:    0.8,
            start_balance:   1000.0,
            latency:         Duration::ZERO,
            seed:            None,
        }
    }
}

impl BacktestConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        Ok(Self {
            bars:            env_or("BACKTEST_BARS", d.bars)?,
            start_price:     env_or("BACKTEST_START_PRICE", d.start_price)?,
            volatility:      env_or("BACKTEST_VOLATILITY", d.volatility)?,
            volume_min:      env_or("BACKTEST_VOLUME_MIN", d.volume_min)?,
            volume_max:      env_or("BACKTEST_VOLUME_MAX", d.volume_max)?,
            win_probability: env_or("BACKTEST_WIN_PROBABILITY", d.win_probability)?,
            payout_ratio:    env_or("BACKTEST_PAYOUT", d.payout_ratio)?,
            start_balance:   env_or("BACKTEST_START_BALANCE", d.start_balance)?,
            latency:         Duration::from_millis(env_or("BACKTEST_LATENCY_MS", 0u64)?),
            seed:            env_opt("BACKTEST_SEED")?,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Like [`env_or`] for options without a default: unset is `None`, garbage is an error.
fn env_opt<T: FromStr>(key: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(None),
    }
}
