//! # market — Market Feed contract
//!
//! Anything that can hand the session the latest bars and a quote: the live
//! HTTP bridge ([`crate::broker::HttpBroker`]) or a replayed series in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Bar, Quote};

#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// The most recent `count` bars for `pair` / `timeframe`, oldest first.
    async fn bars(&self, pair: &str, timeframe: &str, count: usize) -> Result<Vec<Bar>>;

    /// Current bid / ask, used for the spread precondition.
    async fn quote(&self, pair: &str) -> Result<Quote>;
}

/// Current bar volume divided by the mean volume of the trailing `lookback`
/// bars (the current bar included).
///
/// Returns `0.0` for an empty window or a zero mean, which never confirms.
pub fn volume_ratio(bars: &[Bar], lookback: usize) -> f64 {
    let window = &bars[bars.len().saturating_sub(lookback.max(1))..];
    let Some(current) = window.last() else {
        return 0.0;
    };

    let avg = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
    if avg > 0.0 {
        current.volume / avg
    } else {
        0.0
    }
}
