//! # error
//!
//! Centralised bot error type.
//!
//! Every collaborator (feed, executor, journal) returns `Result<_, BotError>`.
//! The trading loop catches these at the cycle boundary, logs them and moves
//! on to the next cycle; only a circuit-breaker halt (which is *not* an error,
//! see [`crate::risk::HaltReason`]) or an external stop ends a session.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    /// Feed or broker unreachable, auth refused, request timed out.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Empty or malformed bar set, non-positive reference price, etc.
    #[error("Data error: {0}")]
    Data(String),

    /// Trading precondition unmet — the trade is simply not placed.
    #[error("Spread too wide: {spread:.2} pips > limit {limit:.2}")]
    SpreadTooWide { spread: f64, limit: f64 },

    /// The broker refused the order.
    #[error("Trade rejected: {0}")]
    Rejected(String),

    /// Invalid session configuration.
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl BotError {
    /// `true` when the trade was skipped on purpose rather than because
    /// something broke.
    pub fn is_precondition(&self) -> bool {
        matches!(self, BotError::SpreadTooWide { .. })
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BotError::Data(format!("bridge response parse error: {err}"))
        } else {
            BotError::Connectivity(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_is_a_precondition_not_a_fault() {
        let err = BotError::SpreadTooWide { spread: 3.5, limit: 2.0 };
        assert!(err.is_precondition());
        assert_eq!(err.to_string(), "Spread too wide: 3.50 pips > limit 2.00");

        assert!(!BotError::Connectivity("down".into()).is_precondition());
        assert!(!BotError::Rejected("no funds".into()).is_precondition());
    }
}
