//! # engine::stake
//!
//! **Stake Controller** — bounded martingale over the trade history.
//!
//! ## States
//! ```text
//! Base (level 0) ──2 losses──▶ Escalated(1) ──2 losses──▶ ... ──▶ Halted (level == max)
//!      ▲                              │
//!      └────────────── win ───────────┘
//! ```
//!
//! Each completed trade is evaluated exactly once. The controller remembers
//! how much of the history it has already consumed, so calling
//! [`StakeController::evaluate`] again with no new trade is a no-op.

use serde::Serialize;
use tracing::info;

use crate::models::TradeRecord;

// ─── Phase ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StakePhase {
    Base,
    Escalated(u32),
    /// Escalation cap reached; the circuit breaker must stop the session.
    Halted,
}

/// What a single evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeUpdate {
    /// No new trade, fewer than two trades, or nothing to do.
    Unchanged,
    Doubled { level: u32 },
    Reset,
}

// ─── StakeState ───────────────────────────────────────────────────────────────

/// `current_stake` and `escalation_level` always move together:
/// `current_stake == initial_stake * 2^escalation_level`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StakeState {
    pub initial_stake:        f64,
    pub current_stake:        f64,
    pub escalation_level:     u32,
    pub max_escalation_level: u32,
}

// ─── StakeController ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StakeController {
    state:     StakeState,
    /// Number of history entries already evaluated.
    evaluated: usize,
}

impl StakeController {
    pub fn new(initial_stake: f64, max_escalation_level: u32) -> Self {
        Self {
            state: StakeState {
                initial_stake,
                current_stake: initial_stake,
                escalation_level: 0,
                max_escalation_level,
            },
            evaluated: 0,
        }
    }

    pub fn state(&self) -> StakeState {
        self.state
    }

    pub fn current_stake(&self) -> f64 {
        self.state.current_stake
    }

    pub fn phase(&self) -> StakePhase {
        match self.state.escalation_level {
            0 if self.state.max_escalation_level > 0 => StakePhase::Base,
            k if k >= self.state.max_escalation_level => StakePhase::Halted,
            k => StakePhase::Escalated(k),
        }
    }

    /// `true` once the escalation cap is reached.
    pub fn at_cap(&self) -> bool {
        self.state.escalation_level >= self.state.max_escalation_level
    }

    /// `"Gann"` at base stake, `"Gann_M{k}"` when escalated.
    pub fn signal_label(&self) -> String {
        match self.state.escalation_level {
            0 => "Gann".to_string(),
            k => format!("Gann_M{k}"),
        }
    }

    /// Applies the martingale rule to the most recent trades.
    ///
    /// 1. last two lost and below cap → double stake, level + 1
    /// 2. else last won              → back to initial stake, level 0
    pub fn evaluate(&mut self, history: &[TradeRecord]) -> StakeUpdate {
        if history.len() <= self.evaluated {
            return StakeUpdate::Unchanged;
        }
        self.evaluated = history.len();

        let [.., previous, last] = history else {
            return StakeUpdate::Unchanged;
        };

        if !previous.won && !last.won && !self.at_cap() {
            self.state.current_stake *= 2.0;
            self.state.escalation_level += 1;
            info!(
                stake = self.state.current_stake,
                level = self.state.escalation_level,
                max   = self.state.max_escalation_level,
                "📈 Martingale applied"
            );
            return StakeUpdate::Doubled { level: self.state.escalation_level };
        }

        if last.won {
            if self.state.escalation_level > 0 {
                info!(
                    from_level = self.state.escalation_level,
                    "🔄 Resetting martingale after profitable trade"
                );
            }
            self.reset();
            return StakeUpdate::Reset;
        }

        StakeUpdate::Unchanged
    }

    fn reset(&mut self) {
        self.state.current_stake = self.state.initial_stake;
        self.state.escalation_level = 0;
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, TradeOutcome};
    use chrono::Utc;

    fn trade(won: bool, stake: f64) -> TradeRecord {
        let outcome = if won { TradeOutcome::win(stake * 0.8) } else { TradeOutcome::loss(stake) };
        TradeRecord::new(Utc::now(), 1.08, "Gann".into(), Direction::Call, stake, outcome)
    }

    fn history(outcomes: &[bool]) -> Vec<TradeRecord> {
        outcomes.iter().map(|&w| trade(w, 1.0)).collect()
    }

    #[test]
    fn fewer_than_two_trades_makes_no_decision() {
        let mut c = StakeController::new(1.0, 2);
        assert_eq!(c.evaluate(&[]), StakeUpdate::Unchanged);
        assert_eq!(c.evaluate(&history(&[false])), StakeUpdate::Unchanged);
        assert_eq!(c.current_stake(), 1.0);
        assert_eq!(c.phase(), StakePhase::Base);
    }

    #[test]
    fn two_losses_double_the_stake() {
        let mut c = StakeController::new(1.0, 2);
        let h = history(&[false, false]);
        assert_eq!(c.evaluate(&h), StakeUpdate::Doubled { level: 1 });
        assert_eq!(c.current_stake(), 2.0);
        assert_eq!(c.state().escalation_level, 1);
        assert_eq!(c.phase(), StakePhase::Escalated(1));
        assert_eq!(c.signal_label(), "Gann_M1");
    }

    #[test]
    fn same_history_is_not_evaluated_twice() {
        let mut c = StakeController::new(1.0, 5);
        let h = history(&[false, false]);
        c.evaluate(&h);
        assert_eq!(c.evaluate(&h), StakeUpdate::Unchanged);
        assert_eq!(c.current_stake(), 2.0);
    }

    #[test]
    fn three_losses_reach_the_cap() {
        let mut c = StakeController::new(1.0, 2);
        let mut h = history(&[false, false]);
        c.evaluate(&h);
        h.push(trade(false, 2.0));
        assert_eq!(c.evaluate(&h), StakeUpdate::Doubled { level: 2 });
        assert_eq!(c.current_stake(), 4.0);
        assert!(c.at_cap());
        assert_eq!(c.phase(), StakePhase::Halted);

        // no doubling past the cap
        h.push(trade(false, 4.0));
        assert_eq!(c.evaluate(&h), StakeUpdate::Unchanged);
        assert_eq!(c.current_stake(), 4.0);
        assert_eq!(c.state().escalation_level, 2);
    }

    #[test]
    fn win_resets_regardless_of_depth() {
        let mut c = StakeController::new(1.0, 5);
        let mut h = history(&[false, false]);
        c.evaluate(&h);
        h.push(trade(false, 2.0));
        c.evaluate(&h);
        assert_eq!(c.state().escalation_level, 2);

        h.push(trade(true, 4.0));
        assert_eq!(c.evaluate(&h), StakeUpdate::Reset);
        assert_eq!(c.current_stake(), 1.0);
        assert_eq!(c.state().escalation_level, 0);
        assert_eq!(c.signal_label(), "Gann");
    }

    #[test]
    fn loss_after_win_keeps_stake() {
        let mut c = StakeController::new(1.0, 2);
        assert_eq!(c.evaluate(&history(&[true, false])), StakeUpdate::Unchanged);
        assert_eq!(c.current_stake(), 1.0);
    }
}
