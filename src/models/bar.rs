//! # models::bar
//!
//! Defines [`Bar`], one fixed-duration OHLCV aggregation for a timeframe, and
//! [`Quote`], the bid/ask pair used for the pre-trade spread check.
//!
//! Bars are immutable once produced and always handed around ordered by
//! timestamp, most recent last.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single completed candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time (UTC).
    pub time:   DateTime<Utc>,
    pub open:   f64,
    pub high:   f64,
    pub low:    f64,
    pub close:  f64,
    pub volume: f64,
}

/// Best bid / ask for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    /// Spread expressed in pips, e.g. `pip_factor = 10_000` for EURUSD.
    #[inline]
    pub fn spread_pips(&self, pip_factor: f64) -> f64 {
        (self.ask - self.bid).abs() * pip_factor
    }
}
