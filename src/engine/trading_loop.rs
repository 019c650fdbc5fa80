//! # engine::trading_loop
//!
//! **Trading Loop** — the live, bar-aligned cycle.
//!
//! ## Cycle
//! ```text
//! 1. fetch last N bars                 (MarketFeed)
//! 2. latest bar already processed?     → sleep to next bar boundary, retry
//! 3. new bar: levels → signal → volume (Session::evaluate)
//! 4. entry: martingale → breaker       (Session::prepare_trade)
//!           execute, wait for expiry   (TradeExecutor)
//!           record → martingale → breaker
//! 5. short idle, repeat
//! ```
//!
//! Only one trade is ever in flight. Errors are caught per cycle, logged, and
//! followed by a short backoff; only a breaker halt or an external stop ends
//! the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::TradeJournal;
use crate::clock::{until_next_bar, Clock};
use crate::config::BotConfig;
use crate::engine::executor::TradeExecutor;
use crate::engine::session::{Evaluation, Session, SessionSummary};
use crate::error::{BotError, Result};
use crate::market::MarketFeed;
use crate::models::TradeRecord;
use crate::risk::HaltReason;

// ─── Stop Handle ──────────────────────────────────────────────────────────────

/// External cancellation, observed at the top of every cycle.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── Cycle Outcome ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No new bar yet; already waited for the next boundary.
    Idle,
    NoSignal,
    Unconfirmed,
    Traded(Box<TradeRecord>),
    /// Trade precondition unmet (e.g. spread); nothing was placed.
    Skipped(String),
    Halted(HaltReason),
}

// ─── Trading Loop ─────────────────────────────────────────────────────────────

pub struct TradingLoop {
    config:         BotConfig,
    timeframe_secs: u64,
    feed:           Arc<dyn MarketFeed>,
    executor:       Arc<dyn TradeExecutor>,
    clock:          Arc<dyn Clock>,
    session:        Session,
    journal:        Option<TradeJournal>,
    stop:           StopHandle,
}

impl TradingLoop {
    /// Captures the initial balance from the executor and opens the session.
    pub async fn start(
        config:   BotConfig,
        feed:     Arc<dyn MarketFeed>,
        executor: Arc<dyn TradeExecutor>,
        clock:    Arc<dyn Clock>,
        stop:     StopHandle,
    ) -> Result<Self> {
        let timeframe_secs = config
            .timeframe_secs()
            .map_err(|e| BotError::Config(e.to_string()))?;
        let initial_balance = initial_balance(&config, executor.as_ref(), clock.as_ref()).await?;
        let session = Session::new(&config, initial_balance);

        Ok(Self {
            config,
            timeframe_secs,
            feed,
            executor,
            clock,
            session,
            journal: None,
            stop,
        })
    }

    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until the breaker halts or a stop is requested.
    pub async fn run(&mut self) -> SessionSummary {
        info!(
            pair      = %self.config.pair,
            timeframe = %self.config.timeframe,
            balance   = self.session.state().initial_balance,
            stake     = self.config.initial_stake,
            "▶️ Starting Gann Square + Martingale session"
        );

        while self.session.is_running() {
            if self.stop.is_stopped() {
                info!("🛑 Stop requested — ending session");
                self.session.stop();
                break;
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::Idle) => {}
                Ok(CycleOutcome::Halted(reason)) => {
                    warn!(%reason, "Session halted by circuit breaker");
                    break;
                }
                Ok(_) => self.clock.sleep(self.config.idle_delay).await,
                Err(e) => {
                    error!(error = %e, "❌ Error in trading cycle — retrying after backoff");
                    self.clock.sleep(self.config.error_backoff).await;
                }
            }
        }

        let summary = self.session.summary();
        info!(
            trades       = summary.total_trades,
            win_rate     = summary.win_rate,
            total_profit = summary.total_profit,
            phase        = ?summary.stake_phase,
            cache_hits   = summary.level_cache_hits,
            "⏹️ Session stopped"
        );
        summary
    }

    /// One pass of the cycle. Errors are returned, not swallowed; `run`
    /// decides what to do with them.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let bars = self
            .feed
            .bars(&self.config.pair, &self.config.timeframe, self.config.bars_per_cycle)
            .await?;

        let latest = *bars
            .last()
            .ok_or_else(|| BotError::Data("feed returned no bars".into()))?;

        if !self.session.is_new_bar(&latest) {
            let wait = until_next_bar(self.clock.now(), self.timeframe_secs, self.config.bar_buffer);
            self.clock.sleep(wait).await;
            return Ok(CycleOutcome::Idle);
        }

        self.session.mark_processed(&latest);
        info!(time = %latest.time, price = latest.close, "🕯️ New bar detected");

        let entry = match self.session.evaluate(&bars)? {
            Evaluation::Entry(entry) => entry,
            Evaluation::NoSignal { .. } => return Ok(CycleOutcome::NoSignal),
            Evaluation::Unconfirmed { .. } => return Ok(CycleOutcome::Unconfirmed),
        };

        let ticket = match self.session.prepare_trade() {
            Ok(ticket) => ticket,
            Err(reason) => return Ok(CycleOutcome::Halted(reason)),
        };

        let outcome = match self
            .executor
            .execute(&self.config.pair, entry.direction, ticket.stake)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) if e.is_precondition() => {
                warn!(reason = %e, "Trade not placed");
                return Ok(CycleOutcome::Skipped(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let (record, halt) = self.session.record(&entry, ticket, outcome);

        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.append(&record) {
                error!(error = %e, "Failed to write trade journal row");
            }
        }

        match halt {
            Some(reason) => Ok(CycleOutcome::Halted(reason)),
            None => Ok(CycleOutcome::Traded(Box::new(record))),
        }
    }
}

/// First balance read, retried like the broker connect at start-up.
async fn initial_balance(config: &BotConfig, executor: &dyn TradeExecutor, clock: &dyn Clock) -> Result<f64> {
    let attempts = config.connect_attempts.max(1);
    let mut attempt = 1;
    loop {
        match executor.balance().await {
            Ok(balance) => return Ok(balance),
            Err(e) if attempt < attempts => {
                warn!(attempt, max = attempts, error = %e, "Balance read failed — retrying");
                clock.sleep(config.connect_retry_delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(attempts, error = %e, "Could not read the starting balance");
                return Err(e);
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::clock::ManualClock;
    use crate::models::{Bar, Direction, Quote, TradeOutcome};

    // ── Fakes ─────────────────────────────────────────────────────────────────

    /// Plays back scripted fetch results, then requests a stop.
    struct ReplayFeed {
        script: Mutex<VecDeque<Result<Vec<Bar>>>>,
        stop:   StopHandle,
    }

    impl ReplayFeed {
        fn new(script: Vec<Result<Vec<Bar>>>, stop: StopHandle) -> Self {
            Self { script: Mutex::new(script.into()), stop }
        }
    }

    #[async_trait]
    impl MarketFeed for ReplayFeed {
        async fn bars(&self, _pair: &str, _tf: &str, _count: usize) -> Result<Vec<Bar>> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(step) => step,
                None => {
                    self.stop.stop();
                    Err(BotError::Data("replay exhausted".into()))
                }
            }
        }

        async fn quote(&self, _pair: &str) -> Result<Quote> {
            Ok(Quote { bid: 1.0850, ask: 1.0851 })
        }
    }

    /// Loses every trade unless scripted otherwise; remembers stakes.
    struct ScriptedExecutor {
        script:         Mutex<VecDeque<Result<TradeOutcome>>>,
        stakes:         Mutex<Vec<f64>>,
        balance:        f64,
        /// Balance reads that fail before one succeeds.
        balance_errors: Mutex<u32>,
    }

    impl ScriptedExecutor {
        fn new(script: Vec<Result<TradeOutcome>>, balance: f64) -> Self {
            Self {
                script: Mutex::new(script.into()),
                stakes: Mutex::new(Vec::new()),
                balance,
                balance_errors: Mutex::new(0),
            }
        }

        fn failing_balance_reads(self, n: u32) -> Self {
            *self.balance_errors.lock().unwrap() = n;
            self
        }

        fn stakes(&self) -> Vec<f64> {
            self.stakes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TradeExecutor for ScriptedExecutor {
        async fn execute(&self, _pair: &str, _dir: Direction, stake: f64) -> Result<TradeOutcome> {
            let next = self.script.lock().unwrap().pop_front();
            let result = next.unwrap_or(Ok(TradeOutcome::loss(stake)));
            if result.is_ok() {
                self.stakes.lock().unwrap().push(stake);
            }
            result
        }

        async fn balance(&self) -> Result<f64> {
            let mut errors = self.balance_errors.lock().unwrap();
            if *errors > 0 {
                *errors -= 1;
                return Err(BotError::Connectivity("bridge not ready".into()));
            }
            Ok(self.balance)
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, minute, 0).unwrap()
    }

    /// Five bars ending at `minute`; close 100 → Put, last volume spikes.
    fn window(minute: u32) -> Vec<Bar> {
        (0..5)
            .map(|i| {
                let m = minute - 4 + i;
                Bar {
                    time: at(m),
                    open: 100.0,
                    high: 100.0,
                    low: 100.0,
                    close: 100.0,
                    volume: if i == 4 { 1000.0 } else { 100.0 },
                }
            })
            .collect()
    }

    fn config() -> BotConfig {
        BotConfig {
            initial_stake: 1.0,
            max_escalation: 2,
            stop_loss_fraction: 0.05,
            log_file: None,
            ..BotConfig::default()
        }
    }

    async fn build(
        script: Vec<Result<Vec<Bar>>>,
        executor: Arc<ScriptedExecutor>,
        clock: Arc<ManualClock>,
    ) -> TradingLoop {
        let stop = StopHandle::new();
        let feed = Arc::new(ReplayFeed::new(script, stop.clone()));
        TradingLoop::start(config(), feed, executor, clock, stop).await.unwrap()
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn three_losses_halt_on_max_escalation() {
        let exec = Arc::new(ScriptedExecutor::new(vec![], 1_000_000.0));
        let clock = Arc::new(ManualClock::new(at(10)));
        let script = (10..20).map(|m| Ok(window(m))).collect();
        let mut bot = build(script, exec.clone(), clock).await;

        let summary = bot.run().await;

        assert_eq!(exec.stakes(), vec![1.0, 1.0, 2.0]);
        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.halted, Some(HaltReason::MaxEscalation { level: 2, max: 2 }));
        assert_eq!(bot.session().stake().current_stake, 4.0);
        assert!(!bot.session().is_running());
    }

    #[tokio::test]
    async fn same_bar_is_processed_once() {
        let exec = Arc::new(ScriptedExecutor::new(
            vec![Ok(TradeOutcome::win(0.8)), Ok(TradeOutcome::win(0.8))],
            1000.0,
        ));
        let clock = Arc::new(ManualClock::new(at(10) + chrono::Duration::seconds(30)));
        let script = vec![Ok(window(10)), Ok(window(10)), Ok(window(11))];
        let mut bot = build(script, exec.clone(), clock.clone()).await;

        assert!(matches!(bot.run_cycle().await.unwrap(), CycleOutcome::Traded(_)));

        let before = clock.now();
        assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::Idle);
        // waited to the next minute boundary plus the 500 ms buffer
        let waited = clock.now() - before;
        assert!(waited >= chrono::Duration::milliseconds(500));
        assert!(waited <= chrono::Duration::milliseconds(60_500));

        assert!(matches!(bot.run_cycle().await.unwrap(), CycleOutcome::Traded(_)));
        assert_eq!(exec.stakes().len(), 2);
    }

    #[tokio::test]
    async fn transient_errors_do_not_end_the_session() {
        let exec = Arc::new(ScriptedExecutor::new(
            vec![
                Err(BotError::Connectivity("bridge down".into())),
                Ok(TradeOutcome::win(0.8)),
            ],
            1000.0,
        ));
        let clock = Arc::new(ManualClock::new(at(10)));
        let script = vec![
            Err(BotError::Connectivity("timeout".into())),
            Ok(vec![]),
            Ok(window(10)),
            Ok(window(11)),
        ];
        let mut bot = build(script, exec.clone(), clock).await;

        let summary = bot.run().await;

        // feed error, empty bars, executor error: all survived
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.halted, None);
        assert!(!bot.session().is_running());
    }

    #[tokio::test]
    async fn spread_precondition_places_nothing() {
        let exec = Arc::new(ScriptedExecutor::new(
            vec![Err(BotError::SpreadTooWide { spread: 3.0, limit: 2.0 })],
            1000.0,
        ));
        let clock = Arc::new(ManualClock::new(at(10)));
        let mut bot = build(vec![Ok(window(10))], exec.clone(), clock).await;

        let outcome = bot.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Skipped(_)));
        assert!(bot.session().history().is_empty());
        assert!(exec.stakes().is_empty());
    }

    #[tokio::test]
    async fn quiet_volume_never_trades() {
        let exec = Arc::new(ScriptedExecutor::new(vec![], 1000.0));
        let clock = Arc::new(ManualClock::new(at(10)));
        let mut flat = window(10);
        flat[4].volume = 100.0;
        let mut bot = build(vec![Ok(flat)], exec.clone(), clock).await;

        assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::Unconfirmed);
        assert!(exec.stakes().is_empty());
    }

    #[tokio::test]
    async fn external_stop_is_observed_before_the_next_cycle() {
        let exec = Arc::new(ScriptedExecutor::new(vec![], 1000.0));
        let clock = Arc::new(ManualClock::new(at(10)));
        let stop = StopHandle::new();
        let feed = Arc::new(ReplayFeed::new(vec![Ok(window(10))], stop.clone()));
        let mut bot = TradingLoop::start(config(), feed, exec.clone(), clock, stop.clone())
            .await
            .unwrap();

        stop.stop();
        let summary = bot.run().await;
        assert_eq!(summary.total_trades, 0);
        assert!(exec.stakes().is_empty());
    }

    #[tokio::test]
    async fn journal_gets_one_row_per_trade() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new(vec![], 1_000_000.0));
        let clock = Arc::new(ManualClock::new(at(10)));
        let script = (10..20).map(|m| Ok(window(m))).collect();
        let bot = build(script, exec, clock).await;
        let journal = TradeJournal::create_at(dir.path().join("trades.csv")).unwrap();
        let mut bot = bot.with_journal(journal);

        bot.run().await;

        let text = std::fs::read_to_string(dir.path().join("trades.csv")).unwrap();
        // header + 3 trades
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().nth(3).unwrap().contains("Gann_M1,put,2.0,false,-2.0"));
    }

    #[tokio::test]
    async fn starting_balance_is_retried_at_start() {
        let exec = Arc::new(ScriptedExecutor::new(vec![], 750.0).failing_balance_reads(2));
        let clock = Arc::new(ManualClock::new(at(10)));
        let bot = build(vec![], exec, clock.clone()).await;

        assert_eq!(bot.session().state().initial_balance, 750.0);
        // connect_attempts = 3, two 100 ms waits
        assert_eq!(clock.total_slept(), std::time::Duration::from_millis(200));
    }

    #[tokio::test]
    async fn start_fails_once_balance_retries_run_out() {
        let exec = Arc::new(ScriptedExecutor::new(vec![], 750.0).failing_balance_reads(3));
        let clock = Arc::new(ManualClock::new(at(10)));
        let stop = StopHandle::new();
        let feed = Arc::new(ReplayFeed::new(vec![], stop.clone()));

        let started = TradingLoop::start(config(), feed, exec, clock, stop).await;
        assert!(matches!(started, Err(BotError::Connectivity(_))));
    }
}
