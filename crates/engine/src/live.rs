use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{parse_interval, Candle, MarketDataSource, Result, Side, Signal};
use risk::{ExitConfig, ExitPolicy, GovernorHandle, PositionSizer, SizingConfig, TradeRequest};
use strategy::{IndicatorSnapshot, PairAnalysis};

use crate::backtest::{entry_signal, BacktestConfig};
use crate::dispatcher::EngineEvent;

/// A trade idea published for real-time consumers. Only actionable until
/// `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: Uuid,
    pub pair: String,
    pub side: Side,
    pub signal: Signal,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub leverage: f64,
    pub size: f64,
    pub quantity: f64,
    /// Open time of the closed candle the suggestion was derived from.
    pub candle_time: DateTime<Utc>,
    pub snapshot: IndicatorSnapshot,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Entry threshold and filters, shared with backtests.
    pub entry: BacktestConfig,
    pub sizing: SizingConfig,
    pub exits: ExitConfig,
    pub suggestion_ttl_minutes: i64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            entry: BacktestConfig::default(),
            sizing: SizingConfig::default(),
            exits: ExitConfig::default(),
            suggestion_ttl_minutes: 30,
        }
    }
}

/// Turns per-pair analyses into governor-validated suggestions.
///
/// Validation only reads the governor: a suggestion is not a position, so
/// nothing is registered until a fill is reported through the handle.
pub struct LivePipeline {
    config: LiveConfig,
    sizer: PositionSizer,
    exits: ExitPolicy,
    governor: GovernorHandle,
    events: mpsc::Sender<EngineEvent>,
    last_candle: Option<DateTime<Utc>>,
}

impl LivePipeline {
    pub fn new(config: LiveConfig, governor: GovernorHandle, events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            sizer: PositionSizer::new(config.sizing.clone()),
            exits: ExitPolicy::new(config.exits.clone()),
            config,
            governor,
            events,
            last_candle: None,
        }
    }

    /// Run until the analysis channel closes. Call from `tokio::spawn`.
    pub async fn run(mut self, mut analysis_rx: mpsc::Receiver<PairAnalysis>) {
        info!("LivePipeline running");
        while let Some(analysis) = analysis_rx.recv().await {
            if let Err(e) = self.handle(analysis).await {
                warn!(error = %e, "Failed to process analysis");
            }
        }
        warn!("LivePipeline: analysis channel closed");
    }

    /// Process one closed-candle analysis. Returns the published suggestion,
    /// if any.
    pub async fn handle(&mut self, update: PairAnalysis) -> Result<Option<Suggestion>> {
        self.rollover(update.candle.timestamp).await?;

        let Some((side, signal)) = entry_signal(&self.config.entry, &update.analysis) else {
            return Ok(None);
        };
        let snap = &update.analysis.snapshot;
        let price = update.candle.close;

        let balance = self.governor.status().await?.account_balance;
        let sized = match self.sizer.size(balance, price, signal, snap.rsi) {
            Ok(s) => s,
            Err(e) => {
                warn!(pair = %update.pair, error = %e, "Sizing failed, no suggestion");
                return Ok(None);
            }
        };
        let Some(atr) = snap.atr else {
            warn!(pair = %update.pair, "No ATR for suggestion");
            return Ok(None);
        };
        let levels = match self.exits.levels(side, price, atr) {
            Ok(l) => l,
            Err(e) => {
                warn!(pair = %update.pair, error = %e, "Exit levels invalid, no suggestion");
                return Ok(None);
            }
        };

        let request = TradeRequest {
            pair: update.pair.clone(),
            side,
            notional: sized.size,
            risk_amount: sized.size * levels.stop_distance,
        };
        if let Err(reason) = self.governor.validate_trade(request).await? {
            warn!(pair = %update.pair, reason = %reason, "Suggestion rejected by risk governor");
            self.publish(EngineEvent::SignalRejected {
                pair: update.pair,
                reason,
            })
            .await;
            return Ok(None);
        }

        let created_at = Utc::now();
        let suggestion = Suggestion {
            id: Uuid::new_v4(),
            pair: update.pair,
            side,
            signal: signal.clone(),
            entry_price: price,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            leverage: sized.leverage,
            size: sized.size,
            quantity: sized.quantity,
            candle_time: update.candle.timestamp,
            snapshot: snap.clone(),
            created_at,
            expires_at: created_at + Duration::minutes(self.config.suggestion_ttl_minutes),
        };
        info!(
            pair = %suggestion.pair,
            side = %side,
            entry = price,
            stop = suggestion.stop_loss,
            target = suggestion.take_profit,
            strength = signal.strength,
            "Suggestion published"
        );
        self.publish(EngineEvent::Suggestion(suggestion.clone())).await;
        Ok(Some(suggestion))
    }

    async fn publish(&self, event: EngineEvent) {
        if self.events.send(event).await.is_err() {
            warn!("Event channel closed, dropping event");
        }
    }

    async fn rollover(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(prev) = self.last_candle else {
            self.last_candle = Some(now);
            return Ok(());
        };
        if now <= prev {
            return Ok(());
        }
        self.last_candle = Some(now);
        if now.date_naive() != prev.date_naive() {
            debug!(day = %now.date_naive(), "New trading day");
            self.governor.daily_reset().await?;
        }
        if now.iso_week() != prev.iso_week() {
            self.governor.weekly_reset().await?;
        }
        Ok(())
    }
}

// ─── History backfill ────────────────────────────────────────────────────────

/// Closed candles to seed a pair's live window before the stream starts, so
/// suggestions do not wait for the indicator warmup to stream in.
///
/// The newest exchange kline is usually still forming: any candle whose
/// close time is after `now` is dropped.
pub async fn load_history(
    source: &dyn MarketDataSource,
    pair: &str,
    interval: &str,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Candle>> {
    let step = parse_interval(interval)?;
    let mut candles = source.fetch_candles(pair, interval, limit).await?;
    let fetched = candles.len();
    candles.retain(|c| c.is_valid() && c.timestamp + step <= now);
    if candles.len() != fetched {
        debug!(pair = %pair, dropped = fetched - candles.len(), "Dropped open or invalid history candles");
    }
    info!(pair = %pair, source = source.name(), count = candles.len(), "Live history loaded");
    Ok(candles)
}
