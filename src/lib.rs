//! # Gann Bot — Gann Square + Martingale binary-options engine
//!
//! ```text
//!  ┌─────────────┐  bars   ┌────────────────┐  levels  ┌──────────────────┐
//!  │ MarketFeed  │ ──────▶ │ LevelProjector │ ───────▶ │ SignalClassifier │
//!  └─────────────┘         └────────────────┘          └────────┬─────────┘
//!                                                               │ Call / Put
//!  ┌───────────────┐  outcome  ┌─────────────────┐   stake      ▼
//!  │ TradeExecutor │ ◀──────── │ StakeController │ ◀──── volume confirmation
//!  └───────┬───────┘           │ + CircuitBreaker│
//!          │                   └─────────────────┘
//!          └──── TradeRecord ───▶ history ──▶ next cycle
//! ```
//!
//! The same [`engine::Session`] drives both the live [`engine::TradingLoop`]
//! and the [`backtest::BacktestSimulator`].

pub mod audit;
pub mod backtest;
pub mod broker;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod models;
pub mod risk;

pub use error::{BotError, Result};
