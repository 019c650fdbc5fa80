//! # engine::signal
//!
//! **Signal Classifier** — turns a price and its level set into Call / Put.
//!
//! ```text
//! price > level 90°   → CALL   (broke above upper bound)
//! price < level 0°    → PUT    (broke below lower bound)
//! price > level 45°   → CALL   (primary trigger)
//! price < level 45°   → PUT
//! otherwise           → None   (exactly on 45°)
//! ```
//!
//! Pure and total. Volume confirmation is *not* applied here — it needs bar
//! history, see [`crate::market::volume_ratio`] and the session.

use crate::engine::levels::LevelSet;
use crate::models::Signal;

/// First matching rule wins.
pub fn classify(price: f64, levels: &LevelSet) -> Signal {
    if price > levels.level_90() {
        Signal::Call
    } else if price < levels.level_0() {
        Signal::Put
    } else if price > levels.level_45() {
        Signal::Call
    } else if price < levels.level_45() {
        Signal::Put
    } else {
        Signal::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::levels::LevelProjector;
    use proptest::prelude::*;

    fn levels(reference: f64) -> LevelSet {
        LevelProjector::default().project(reference).unwrap()
    }

    #[test]
    fn between_45_and_90_is_call() {
        // level45 = 102.515625, level90 = 105.0625
        assert_eq!(classify(103.0, &levels(100.0)), Signal::Call);
    }

    #[test]
    fn above_upper_bound_is_call() {
        assert_eq!(classify(106.0, &levels(100.0)), Signal::Call);
    }

    #[test]
    fn below_lower_bound_is_put() {
        assert_eq!(classify(99.0, &levels(100.0)), Signal::Put);
    }

    #[test]
    fn own_reference_sits_below_45_and_is_put() {
        // level0 == reference, so the price is not < level0, but is < level45
        assert_eq!(classify(1.0850, &levels(1.0850)), Signal::Put);
    }

    #[test]
    fn exactly_on_45_is_none() {
        let l = levels(144.0);
        assert_eq!(classify(147.015625, &l), Signal::None);
    }

    proptest! {
        #[test]
        fn total_and_deterministic(reference in 1e-3f64..1e5, price in -1e6f64..1e6) {
            let l = levels(reference);
            let a = classify(price, &l);
            let b = classify(price, &l);
            prop_assert_eq!(a, b);
            prop_assert!(matches!(a, Signal::Call | Signal::Put | Signal::None));
            if price != l.level_45() {
                prop_assert_ne!(a, Signal::None);
            }
        }
    }
}
