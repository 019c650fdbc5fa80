//! # broker — Live broker bridge over HTTP
//!
//! The bot does not speak the broker's native protocol. It talks to a small
//! JSON bridge process that wraps the broker session.
//!
//! ## Bridge API Contract
//! ```text
//! POST /connect        { email, password, balance_type }  → { ok, reason? }
//! GET  /candles?pair=&timeframe=&count=                    → [ { time, open, max, min, close, volume } ]
//! GET  /quote?pair=                                        → { bid, ask }
//! GET  /balance                                            → { balance }
//! POST /buy            { stake, pair, direction, expiry_minutes } → { ok, order_id?, message? }
//! GET  /result/{order_id}                                  → { profit }   (profit <= 0 means lost)
//! ```
//!
//! Once `/buy` succeeds the stake is committed. Settlement is polled with
//! bounded retries; an order that never settles is booked as a loss of the
//! full stake so martingale and stop-loss still see it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::BotConfig;
use crate::engine::executor::TradeExecutor;
use crate::error::{BotError, Result};
use crate::market::MarketFeed;
use crate::models::{Bar, Direction, Quote, TradeOutcome};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Bridge Payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    email:        &'a str,
    password:     &'a str,
    balance_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    ok:     bool,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BridgeCandle {
    /// Unix seconds.
    time:   i64,
    open:   f64,
    #[serde(alias = "high")]
    max:    f64,
    #[serde(alias = "low")]
    min:    f64,
    close:  f64,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: f64,
}

#[derive(Debug, Serialize)]
struct BuyRequest<'a> {
    stake:          f64,
    pair:           &'a str,
    direction:      Direction,
    expiry_minutes: u64,
}

#[derive(Debug, Deserialize)]
struct BuyResponse {
    ok:       bool,
    order_id: Option<u64>,
    message:  Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    profit: f64,
}

// ─── HttpBroker ───────────────────────────────────────────────────────────────

pub struct HttpBroker {
    client:             reqwest::Client,
    base_url:           String,
    email:              String,
    password:           String,
    account_mode:       String,
    spread_limit:       f64,
    pip_factor:         f64,
    expiry:             Duration,
    settle_attempts:    u32,
    settle_retry_delay: Duration,
    clock:              Arc<dyn Clock>,
}

impl HttpBroker {
    pub fn new(config: &BotConfig, email: String, password: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
            email,
            password,
            account_mode: config.account_mode.clone(),
            spread_limit: config.spread_limit,
            pip_factor: config.pip_factor,
            expiry: config.expiry,
            settle_attempts: config.settle_attempts.max(1),
            settle_retry_delay: config.settle_retry_delay,
            clock,
        }
    }

    /// Opens the broker session once.
    pub async fn connect(&self) -> Result<()> {
        let resp: ConnectResponse = self
            .client
            .post(format!("{}/connect", self.base_url))
            .json(&ConnectRequest {
                email:        &self.email,
                password:     &self.password,
                balance_type: &self.account_mode,
            })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !resp.ok {
            return Err(BotError::Connectivity(
                resp.reason.unwrap_or_else(|| "connection refused".to_string()),
            ));
        }
        Ok(())
    }

    /// Bounded retries at session start.
    pub async fn connect_with_retry(&self, attempts: u32, delay: Duration) -> Result<()> {
        let attempts = attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            info!(attempt, max = attempts, "🔌 Connecting to broker bridge...");
            match self.connect().await {
                Ok(()) => {
                    info!(mode = %self.account_mode, "✅ Connected to broker");
                    return Ok(());
                }
                Err(e) => {
                    error!(attempt, error = %e, "Connection attempt failed");
                    last_err = Some(e);
                }
            }
            if attempt < attempts {
                info!(delay_ms = delay.as_millis() as u64, "Retrying...");
                self.clock.sleep(delay).await;
            }
        }

        error!("Failed to connect after all retries");
        Err(last_err.unwrap_or_else(|| BotError::Connectivity("no attempts made".into())))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Connectivity(format!("bridge HTTP {status}: {body}")));
        }
        Ok(resp.json().await?)
    }

    /// Polls `/result/{order_id}` until it answers or attempts run out.
    async fn settle(&self, order_id: u64, stake: f64) -> TradeOutcome {
        let path = format!("/result/{order_id}");

        for attempt in 1..=self.settle_attempts {
            match self.get_json::<ResultResponse>(&path, &[]).await {
                Ok(result) => {
                    let outcome = if result.profit > 0.0 {
                        TradeOutcome::win(result.profit)
                    } else {
                        TradeOutcome::loss(stake)
                    };
                    info!(order_id, won = outcome.won, profit = outcome.profit, "Trade settled");
                    return outcome;
                }
                Err(e) => {
                    warn!(order_id, attempt, max = self.settle_attempts, error = %e, "Trade result not available");
                    if attempt < self.settle_attempts {
                        self.clock.sleep(self.settle_retry_delay).await;
                    }
                }
            }
        }

        error!(order_id, stake, "❌ Could not settle trade — booking it as a loss");
        TradeOutcome::loss(stake)
    }
}

#[async_trait]
impl MarketFeed for HttpBroker {
    async fn bars(&self, pair: &str, timeframe: &str, count: usize) -> Result<Vec<Bar>> {
        let candles: Vec<BridgeCandle> = self
            .get_json(
                "/candles",
                &[
                    ("pair", pair.to_string()),
                    ("timeframe", timeframe.to_string()),
                    ("count", count.to_string()),
                ],
            )
            .await?;

        let mut bars = candles
            .into_iter()
            .map(|c| -> Result<Bar> {
                let time = DateTime::<Utc>::from_timestamp(c.time, 0)
                    .ok_or_else(|| BotError::Data(format!("invalid candle timestamp {}", c.time)))?;
                Ok(Bar { time, open: c.open, high: c.max, low: c.min, close: c.close, volume: c.volume })
            })
            .collect::<Result<Vec<_>>>()?;

        bars.sort_by_key(|b| b.time);
        Ok(bars)
    }

    async fn quote(&self, pair: &str) -> Result<Quote> {
        self.get_json("/quote", &[("pair", pair.to_string())]).await
    }
}

#[async_trait]
impl TradeExecutor for HttpBroker {
    async fn execute(&self, pair: &str, direction: Direction, stake: f64) -> Result<TradeOutcome> {
        // ── Spread precondition ───────────────────────────────────────────────
        let spread = self.quote(pair).await?.spread_pips(self.pip_factor);
        if spread > self.spread_limit {
            warn!(spread, limit = self.spread_limit, "Spread too high — skipping trade");
            return Err(BotError::SpreadTooWide { spread, limit: self.spread_limit });
        }

        info!(%direction, stake, pair, "🚀 Executing trade");

        // ── Place ─────────────────────────────────────────────────────────────
        let expiry_minutes = (self.expiry.as_secs() / 60).max(1);
        let resp: BuyResponse = self
            .client
            .post(format!("{}/buy", self.base_url))
            .json(&BuyRequest { stake, pair, direction, expiry_minutes })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let order_id = match (resp.ok, resp.order_id) {
            (true, Some(id)) => id,
            _ => {
                let msg = resp.message.unwrap_or_else(|| "unknown".to_string());
                error!(message = %msg, "Trade execution failed");
                return Err(BotError::Rejected(msg));
            }
        };

        // ── Wait for expiry, then settle ──────────────────────────────────────
        self.clock.sleep(self.expiry).await;
        Ok(self.settle(order_id, stake).await)
    }

    async fn balance(&self) -> Result<f64> {
        let resp: BalanceResponse = self.get_json("/balance", &[]).await?;
        info!(balance = resp.balance, "💰 Current balance");
        Ok(resp.balance)
    }
}
