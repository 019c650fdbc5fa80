//! # engine::levels
//!
//! **Level Projector** — Gann Square price levels at 45° increments.
//!
//! ```text
//! level(angle) = (sqrt(reference) + angle / 360)^2
//!
//! reference = 144.0
//!   0°   → 144.000000
//!   45°  → 147.015625
//!   90°  → 150.062500
//!   ...
//!   360° → 169.000000
//! ```
//!
//! The projector memoises by the *exact* bit pattern of the reference price.
//! The cache is owned by the session (never process-wide) and may be evicted
//! at any time without changing results.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::error::{BotError, Result};

/// The fixed, ordered set of projection angles in degrees.
pub const ANGLES: [u16; 9] = [0, 45, 90, 135, 180, 225, 270, 315, 360];

/// Default number of reference prices kept before the oldest is evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

// ─── LevelSet ─────────────────────────────────────────────────────────────────

/// Derived price per angle, stored in [`ANGLES`] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSet {
    levels: [f64; 9],
}

impl LevelSet {
    /// Computes the nine levels for `reference` without touching any cache.
    fn compute(reference: f64) -> Self {
        let root = reference.sqrt();
        let mut levels = [0.0; 9];
        for (slot, angle) in levels.iter_mut().zip(ANGLES) {
            let step = root + f64::from(angle) / 360.0;
            *slot = step * step;
        }
        Self { levels }
    }

    /// Level for one of the [`ANGLES`]; `None` for any other angle.
    pub fn get(&self, angle: u16) -> Option<f64> {
        ANGLES.iter().position(|&a| a == angle).map(|i| self.levels[i])
    }

    /// Lower confirmation bound.
    #[inline]
    pub fn level_0(&self) -> f64 {
        self.levels[0]
    }

    /// Primary trigger.
    #[inline]
    pub fn level_45(&self) -> f64 {
        self.levels[1]
    }

    /// Upper confirmation bound.
    #[inline]
    pub fn level_90(&self) -> f64 {
        self.levels[2]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, f64)> + '_ {
        ANGLES.iter().copied().zip(self.levels.iter().copied())
    }

}

// ─── LevelProjector ───────────────────────────────────────────────────────────

/// Memoising projector. Keyed by `f64::to_bits`, so equality is exact.
#[derive(Debug)]
pub struct LevelProjector {
    cache:    HashMap<u64, LevelSet>,
    /// Insertion order, for FIFO eviction once `capacity` is reached.
    order:    VecDeque<u64>,
    capacity: usize,
    hits:     u64,
}

impl LevelProjector {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache:    HashMap::new(),
            order:    VecDeque::new(),
            capacity: capacity.max(1),
            hits:     0,
        }
    }

    /// Projects the level set for a strictly positive, finite reference price.
    pub fn project(&mut self, reference: f64) -> Result<LevelSet> {
        if !reference.is_finite() || reference <= 0.0 {
            return Err(BotError::Data(format!(
                "reference price must be positive and finite, got {reference}"
            )));
        }

        let key = reference.to_bits();
        if let Some(levels) = self.cache.get(&key) {
            self.hits += 1;
            return Ok(*levels);
        }

        let levels = LevelSet::compute(reference);

        if self.cache.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.cache.remove(&oldest);
                debug!(capacity = self.capacity, "Level cache full — evicted oldest reference");
            }
        }
        self.cache.insert(key, levels);
        self.order.push_back(key);

        Ok(levels)
    }

    /// Number of cached reference prices.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// How many `project` calls were answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

impl Default for LevelProjector {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
