//! # clock
//!
//! Wall-clock and timer abstraction. The live loop only ever waits through a
//! [`Clock`], so tests and fast backtests can swap in [`ManualClock`] and run
//! without real delays.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Shortest wait the loop ever schedules while idling for a bar.
pub const MIN_BAR_WAIT: Duration = Duration::from_millis(100);

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

// ─── System Clock ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ─── Manual Clock ─────────────────────────────────────────────────────────────

/// Simulated time: `sleep` advances `now` instantly.
#[derive(Debug)]
pub struct ManualClock {
    now:   Mutex<DateTime<Utc>>,
    slept: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now:   Mutex::new(start),
            slept: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    /// Total time spent in `sleep` so far.
    pub fn total_slept(&self) -> Duration {
        self.slept.lock().map(|s| *s).unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|p| *p.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            *slept += duration;
        }
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ─── Bar Boundary ─────────────────────────────────────────────────────────────

/// Time left until the next `timeframe_secs` boundary, plus `buffer`.
///
/// With a 60 s timeframe at `hh:mm:42.3` and a 500 ms buffer this is 18.2 s.
/// Never returns less than [`MIN_BAR_WAIT`].
pub fn until_next_bar(now: DateTime<Utc>, timeframe_secs: u64, buffer: Duration) -> Duration {
    let frame_ms = timeframe_secs.max(1) * 1000;
    let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    let remaining = Duration::from_millis(frame_ms - now_ms % frame_ms);
    (remaining + buffer).max(MIN_BAR_WAIT)
}
