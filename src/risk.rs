//! # risk — Circuit Breaker
//!
//! The last gate before every trade, evaluated again after it resolves.
//!
//! ## Halt conditions
//! 1. **Max escalation** — martingale level reached its cap
//! 2. **Stop-loss**      — `(initial - balance) / initial >= stop_loss_fraction`
//!                         (only when `initial > 0`)
//!
//! A halt is one-way: once tripped the breaker never re-arms within the
//! session.

use serde::Serialize;
use tracing::warn;

use crate::engine::stake::StakeState;

// ─── Halt Reason ──────────────────────────────────────────────────────────────

/// Why a session stopped. A deliberate stop, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaltReason {
    MaxEscalation { level: u32, max: u32 },
    StopLoss { loss_fraction: f64, limit: f64 },
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::MaxEscalation { level, max } => {
                write!(f, "maximum martingale level reached ({level}/{max})")
            }
            HaltReason::StopLoss { loss_fraction, limit } => write!(
                f,
                "stop loss triggered ({:.2}% >= {:.2}%)",
                loss_fraction * 100.0,
                limit * 100.0
            ),
        }
    }
}

// ─── Decision ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerDecision {
    Continue,
    Halt(HaltReason),
}

// ─── Circuit Breaker ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    stop_loss_fraction: f64,
    tripped:            Option<HaltReason>,
}

impl CircuitBreaker {
    pub fn new(stop_loss_fraction: f64) -> Self {
        Self { stop_loss_fraction, tripped: None }
    }

    /// Evaluates both halt conditions. Latches the first halt observed.
    pub fn check(
        &mut self,
        stake:           &StakeState,
        initial_balance: f64,
        balance:         f64,
    ) -> BreakerDecision {
        if let Some(reason) = self.tripped {
            return BreakerDecision::Halt(reason);
        }

        if stake.escalation_level >= stake.max_escalation_level {
            return self.trip(HaltReason::MaxEscalation {
                level: stake.escalation_level,
                max:   stake.max_escalation_level,
            });
        }

        if initial_balance > 0.0 {
            let loss_fraction = (initial_balance - balance) / initial_balance;
            if loss_fraction >= self.stop_loss_fraction {
                return self.trip(HaltReason::StopLoss {
                    loss_fraction,
                    limit: self.stop_loss_fraction,
                });
            }
        }

        BreakerDecision::Continue
    }

    pub fn tripped(&self) -> Option<HaltReason> {
        self.tripped
    }

    fn trip(&mut self, reason: HaltReason) -> BreakerDecision {
        warn!(%reason, "⛔ Circuit breaker tripped — stopping session");
        self.tripped = Some(reason);
        BreakerDecision::Halt(reason)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn stake(level: u32, max: u32) -> StakeState {
        StakeState {
            initial_stake:        1.0,
            current_stake:        f64::from(1u32 << level),
            escalation_level:     level,
            max_escalation_level: max,
        }
    }

    #[test]
    fn continues_within_limits() {
        let mut b = CircuitBreaker::new(0.05);
        assert_eq!(b.check(&stake(1, 2), 1000.0, 990.0), BreakerDecision::Continue);
        assert_eq!(b.tripped(), None);
    }

    #[test]
    fn halts_at_max_escalation() {
        let mut b = CircuitBreaker::new(0.05);
        assert_eq!(
            b.check(&stake(2, 2), 1000.0, 1000.0),
            BreakerDecision::Halt(HaltReason::MaxEscalation { level: 2, max: 2 })
        );
    }

    #[test]
    fn halts_on_stop_loss_below_max_escalation() {
        let mut b = CircuitBreaker::new(0.05);
        let decision = b.check(&stake(0, 2), 1000.0, 950.0);
        assert!(matches!(decision, BreakerDecision::Halt(HaltReason::StopLoss { .. })));
    }

    #[test]
    fn stop_loss_skipped_without_initial_balance() {
        let mut b = CircuitBreaker::new(0.05);
        assert_eq!(b.check(&stake(0, 2), 0.0, -50.0), BreakerDecision::Continue);
    }

    #[test]
    fn halt_is_one_way() {
        let mut b = CircuitBreaker::new(0.05);
        b.check(&stake(0, 2), 1000.0, 900.0);
        // balance recovered, but the breaker stays tripped
        assert!(matches!(
            b.check(&stake(0, 2), 1000.0, 1100.0),
            BreakerDecision::Halt(HaltReason::StopLoss { .. })
        ));
    }
}
