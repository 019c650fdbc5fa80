//! # models::trade
//!
//! Defines the signal vocabulary and [`TradeRecord`], the append-only log of
//! every executed binary option.
//!
//! ## Why separate Signal from Direction?
//! `Signal`    = what the classifier says about the current bar (may be None)
//! `Direction` = what was actually sent to the executor (always Call or Put)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Direction ────────────────────────────────────────────────────────────────

/// Side of a binary option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Price finishes above entry.
    Call,
    /// Price finishes below entry.
    Put,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Call => "call",
            Direction::Put  => "put",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Signal ───────────────────────────────────────────────────────────────────

/// Classifier output for one evaluation cycle. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Call,
    Put,
    /// Price sits exactly on the 45° level.
    None,
}

impl Signal {
    /// The tradable direction, if any.
    #[inline]
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Call => Some(Direction::Call),
            Signal::Put  => Some(Direction::Put),
            Signal::None => None,
        }
    }
}

// ─── TradeOutcome ─────────────────────────────────────────────────────────────

/// What an executor hands back once the option has expired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeOutcome {
    pub won:    bool,
    /// Signed: `stake * payout` on a win, `-stake` on a loss.
    pub profit: f64,
}

impl TradeOutcome {
    pub fn win(profit: f64) -> Self {
        Self { won: true, profit }
    }

    pub fn loss(stake: f64) -> Self {
        Self { won: false, profit: -stake }
    }
}

// ─── TradeRecord ──────────────────────────────────────────────────────────────

/// One executed trade — never mutated after creation.
///
/// The session's history of these is the only input to martingale decisions
/// (last two outcomes) and to stop-loss accounting (sum of `profit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id:     Uuid,
    /// Open time of the bar that produced the entry.
    pub timestamp:    DateTime<Utc>,
    pub entry_price:  f64,
    /// `"Gann"` or `"Gann_M{k}"` when the stake was escalated.
    pub signal_label: String,
    pub direction:    Direction,
    pub stake:        f64,
    pub won:          bool,
    pub profit:       f64,
}

impl TradeRecord {
    pub fn new(
        timestamp:    DateTime<Utc>,
        entry_price:  f64,
        signal_label: String,
        direction:    Direction,
        stake:        f64,
        outcome:      TradeOutcome,
    ) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            timestamp,
            entry_price,
            signal_label,
            direction,
            stake,
            won:    outcome.won,
            profit: outcome.profit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_maps_to_direction() {
        assert_eq!(Signal::Call.direction(), Some(Direction::Call));
        assert_eq!(Signal::Put.direction(), Some(Direction::Put));
        assert_eq!(Signal::None.direction(), None);
    }

    #[test]
    fn direction_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Put).unwrap(), "\"put\"");
        assert_eq!(Direction::Call.to_string(), "call");
    }

    #[test]
    fn outcome_constructors() {
        assert_eq!(TradeOutcome::loss(4.0), TradeOutcome { won: false, profit: -4.0 });
        assert!(TradeOutcome::win(0.8).won);
    }
}
