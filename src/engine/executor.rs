//! # engine::executor
//!
//! **Trade Executor** contract — places one binary option and waits for it to
//! resolve.
//!
//! This module is isolated from the decision logic so that the live loop and
//! the backtest share one interface:
//! * [`crate::broker::HttpBroker`] talks to the real bridge.
//! * [`SimulatedExecutor`] flips a biased coin.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{BotError, Result};
use crate::models::{Direction, TradeOutcome};

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Places the option and returns its realised outcome.
    ///
    /// Fails with a precondition error (e.g. [`BotError::SpreadTooWide`]) when
    /// the trade must not be placed; the caller records nothing in that case.
    async fn execute(&self, pair: &str, direction: Direction, stake: f64) -> Result<TradeOutcome>;

    /// Account balance, read once at session start.
    async fn balance(&self) -> Result<f64>;
}

// ─── Simulated Executor ───────────────────────────────────────────────────────

/// Stochastic outcome model for backtests.
///
/// Wins with a fixed probability and pays `stake * payout_ratio`; a loss costs
/// the full stake. The outcome deliberately ignores the price path.
#[derive(Debug)]
pub struct SimulatedExecutor {
    win_probability: f64,
    payout_ratio:    f64,
    inner:           Mutex<SimInner>,
}

#[derive(Debug)]
struct SimInner {
    rng:     StdRng,
    balance: f64,
}

impl SimulatedExecutor {
    pub fn new(win_probability: f64, payout_ratio: f64, start_balance: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            win_probability: win_probability.clamp(0.0, 1.0),
            payout_ratio,
            inner: Mutex::new(SimInner { rng, balance: start_balance }),
        }
    }
}

#[async_trait]
impl TradeExecutor for SimulatedExecutor {
    async fn execute(&self, _pair: &str, direction: Direction, stake: f64) -> Result<TradeOutcome> {
        if stake.is_nan() || stake <= 0.0 {
            return Err(BotError::Rejected(format!("stake must be positive, got {stake}")));
        }

        let mut inner = self
            .inner
            .lock()
            .map_err(|_| BotError::Rejected("simulator state poisoned".into()))?;

        let outcome = if inner.rng.gen_bool(self.win_probability) {
            TradeOutcome::win(stake * self.payout_ratio)
        } else {
            TradeOutcome::loss(stake)
        };
        inner.balance += outcome.profit;

        debug!(
            %direction,
            stake,
            won    = outcome.won,
            profit = outcome.profit,
            "🎲 Simulated trade resolved"
        );
        Ok(outcome)
    }

    async fn balance(&self) -> Result<f64> {
        self.inner
            .lock()
            .map(|inner| inner.balance)
            .map_err(|_| BotError::Rejected("simulator state poisoned".into()))
    }
}
