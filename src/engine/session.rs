//! # engine::session
//!
//! **Session** — the decision core shared by the live loop and the backtest.
//!
//! ## Per-bar sequence
//! ```text
//! evaluate(window)
//!   1. project levels from the last close      (LevelProjector, cached)
//!   2. classify                                (Call / Put / None)
//!   3. volume ratio > threshold?               (trailing window)
//!        │
//!        ▼ Entry
//! prepare_trade()
//!   4. martingale update on closed trades      (StakeController)
//!   5. circuit breaker (pre-trade)             → Halt: no trade
//!        │
//!        ▼ TradeTicket { stake, label }
//!   ── caller executes the option ──
//! record(entry, ticket, outcome)
//!   6. append TradeRecord, update balance
//!   7. martingale update on the new trade
//!   8. circuit breaker (post-trade)            → Halt: stop session
//! ```
//!
//! The pre-trade check runs *after* escalating, exactly in that order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::BotConfig;
use crate::engine::levels::{LevelProjector, LevelSet};
use crate::engine::signal::classify;
use crate::engine::stake::{StakeController, StakePhase, StakeState};
use crate::error::{BotError, Result};
use crate::market::volume_ratio;
use crate::models::{Bar, Direction, Signal, TradeOutcome, TradeRecord};
use crate::risk::{BreakerDecision, CircuitBreaker, HaltReason};

// ─── Session State ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub balance:            f64,
    /// Captured once at session start; stop-loss denominator for its lifetime.
    pub initial_balance:    f64,
    pub running:            bool,
    pub last_processed_bar: Option<DateTime<Utc>>,
}

// ─── Evaluation ───────────────────────────────────────────────────────────────

/// A confirmed entry on a new bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub time:         DateTime<Utc>,
    pub price:        f64,
    pub direction:    Direction,
    pub volume_ratio: f64,
    pub levels:       LevelSet,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Price exactly on the 45° level.
    NoSignal { price: f64 },
    /// Directional signal without volume confirmation.
    Unconfirmed { signal: Signal, volume_ratio: f64 },
    Entry(Entry),
}

/// Stake and label for the trade about to be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTicket {
    pub stake: f64,
    pub label: String,
}

/// End-of-session statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub initial_balance:  f64,
    pub final_balance:    f64,
    pub total_profit:     f64,
    /// Fraction in `[0, 1]`.
    pub win_rate:         f64,
    pub total_trades:     usize,
    pub halted:           Option<HaltReason>,
    /// Martingale phase when the session ended.
    pub stake_phase:      StakePhase,
    pub levels_cached:    usize,
    /// Level projections answered from the cache.
    pub level_cache_hits: u64,
}

// ─── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Session {
    projector:        LevelProjector,
    stake:            StakeController,
    breaker:          CircuitBreaker,
    history:          Vec<TradeRecord>,
    state:            SessionState,
    volume_threshold: f64,
    volume_lookback:  usize,
}

impl Session {
    pub fn new(config: &BotConfig, initial_balance: f64) -> Self {
        Self {
            projector:        LevelProjector::new(config.level_cache_capacity),
            stake:            StakeController::new(config.initial_stake, config.max_escalation),
            breaker:          CircuitBreaker::new(config.stop_loss_fraction),
            history:          Vec::new(),
            state:            SessionState {
                balance: initial_balance,
                initial_balance,
                running: true,
                last_processed_bar: None,
            },
            volume_threshold: config.volume_threshold,
            volume_lookback:  config.volume_lookback,
        }
    }

    // ─── New-bar detection ────────────────────────────────────────────────────

    /// `true` if `bar` is strictly newer than the last processed bar.
    pub fn is_new_bar(&self, bar: &Bar) -> bool {
        self.state.last_processed_bar.map_or(true, |last| bar.time > last)
    }

    pub fn mark_processed(&mut self, bar: &Bar) {
        self.state.last_processed_bar = Some(bar.time);
    }

    // ─── Signal ───────────────────────────────────────────────────────────────

    /// Evaluates the latest bar of `window` (oldest first).
    pub fn evaluate(&mut self, window: &[Bar]) -> Result<Evaluation> {
        let bar = window
            .last()
            .ok_or_else(|| BotError::Data("empty bar window".into()))?;

        let levels = self.projector.project(bar.close)?;
        let signal = classify(bar.close, &levels);

        let Some(direction) = signal.direction() else {
            debug!(price = bar.close, "No signal — price on the 45° level");
            return Ok(Evaluation::NoSignal { price: bar.close });
        };

        let ratio = volume_ratio(window, self.volume_lookback);
        if ratio <= self.volume_threshold {
            debug!(
                ?signal,
                volume_ratio = ratio,
                threshold    = self.volume_threshold,
                "Signal without volume confirmation"
            );
            return Ok(Evaluation::Unconfirmed { signal, volume_ratio: ratio });
        }

        info!(
            direction = %direction,
            price     = bar.close,
            level_45  = levels.level_45(),
            volume_ratio = ratio,
            "🎯 Signal generated"
        );

        Ok(Evaluation::Entry(Entry {
            time: bar.time,
            price: bar.close,
            direction,
            volume_ratio: ratio,
            levels,
        }))
    }

    // ─── Stake & Breaker ──────────────────────────────────────────────────────

    /// Martingale update followed by the pre-trade breaker check.
    pub fn prepare_trade(&mut self) -> std::result::Result<TradeTicket, HaltReason> {
        self.stake.evaluate(&self.history);
        if let Some(reason) = self.check_breaker() {
            return Err(reason);
        }
        debug!(phase = ?self.stake.phase(), stake = self.stake.current_stake(), "Trade prepared");
        Ok(TradeTicket {
            stake: self.stake.current_stake(),
            label: self.stake.signal_label(),
        })
    }

    /// Appends the executed trade and re-runs martingale + breaker.
    pub fn record(
        &mut self,
        entry:   &Entry,
        ticket:  TradeTicket,
        outcome: TradeOutcome,
    ) -> (TradeRecord, Option<HaltReason>) {
        let record = TradeRecord::new(
            entry.time,
            entry.price,
            ticket.label,
            entry.direction,
            ticket.stake,
            outcome,
        );
        self.state.balance += outcome.profit;
        self.history.push(record.clone());

        info!(
            direction = %record.direction,
            stake     = record.stake,
            won       = record.won,
            profit    = record.profit,
            balance   = self.state.balance,
            "{}",
            if record.won { "✅ Trade won" } else { "❌ Trade lost" }
        );

        self.stake.evaluate(&self.history);
        let halt = self.check_breaker();
        (record, halt)
    }

    /// Evaluates the breaker; on a halt the session stops running for good.
    pub fn check_breaker(&mut self) -> Option<HaltReason> {
        let stake = self.stake.state();
        match self.breaker.check(&stake, self.state.initial_balance, self.state.balance) {
            BreakerDecision::Continue => None,
            BreakerDecision::Halt(reason) => {
                self.state.running = false;
                Some(reason)
            }
        }
    }

    /// External stop request.
    pub fn stop(&mut self) {
        self.state.running = false;
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stake(&self) -> StakeState {
        self.stake.state()
    }

    pub fn history(&self) -> &[TradeRecord] {
        &self.history
    }

    pub fn halted(&self) -> Option<HaltReason> {
        self.breaker.tripped()
    }

    pub fn summary(&self) -> SessionSummary {
        let total_trades = self.history.len();
        let wins = self.history.iter().filter(|t| t.won).count();
        SessionSummary {
            initial_balance:  self.state.initial_balance,
            final_balance:    self.state.balance,
            total_profit:     self.state.balance - self.state.initial_balance,
            win_rate:         if total_trades > 0 { wins as f64 / total_trades as f64 } else { 0.0 },
            total_trades,
            halted:           self.halted(),
            stake_phase:      self.stake.phase(),
            levels_cached:    self.projector.cached(),
            level_cache_hits: self.projector.hits(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
