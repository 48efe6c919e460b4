//! Single-asset, single-position backtest.
//!
//! [`simulate`] is pure and synchronous: the same candles and configuration
//! always produce the same trades, equity curve and metrics. Fetching data
//! belongs to [`BacktestRunner`](crate::BacktestRunner).

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use common::{
    Candle, EquityPoint, Error, ExitReason, Position, Result, Side, Signal, SignalSource,
    SignalType, Trade,
};
use risk::{
    ExitConfig, ExitDecision, ExitPolicy, ExposureId, GovernorConfig, PositionSizer, RiskGovernor,
    RiskStatus, SizingConfig, TradeRequest,
};
use strategy::{AnalyzerConfig, Analysis, IndicatorSet, SignalAnalyzer};

use crate::metrics::Metrics;

/// Signal-quality gate applied before entries.
///
/// A signal passes with at least `min_confirmations` agreeing detectors, or
/// when a lone signal's strength falls inside `[weak_min, weak_max)`. Lone
/// signals above `weak_max` are treated as likely manipulated spikes and
/// refused. The window is an empirical guard; tune it freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    pub enabled: bool,
    pub min_confirmations: u32,
    pub weak_min: f64,
    pub weak_max: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confirmations: 2,
            weak_min: 0.3,
            weak_max: 0.5,
        }
    }
}

impl QualityGate {
    pub fn passes(&self, strength: f64, confirmations: u32) -> bool {
        !self.enabled
            || confirmations >= self.min_confirmations
            || (strength >= self.weak_min && strength < self.weak_max)
    }
}

/// Simulation parameters (`[backtest]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_balance: f64,
    /// Charged on each leg, as a fraction of the position size.
    pub commission_rate: f64,
    /// Runs with fewer candles fail fast.
    pub min_candles: usize,
    /// Candles to wait after an exit before a new entry.
    pub cooldown: usize,
    /// Minimum combined signal strength for an entry.
    pub entry_threshold: f64,
    pub min_adx: f64,
    pub min_volume_ratio: f64,
    /// Require RSI to be turning in the signal's direction.
    pub require_momentum: bool,
    pub quality: QualityGate,
    /// Route entries through a [`RiskGovernor`] with day/week rollover.
    pub use_governor: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            commission_rate: 0.0004,
            min_candles: 50,
            cooldown: 3,
            entry_threshold: 0.3,
            min_adx: 20.0,
            min_volume_ratio: 0.8,
            require_momentum: true,
            quality: QualityGate::default(),
            use_governor: false,
        }
    }
}

/// Everything one run needs. Serialized into the result as `params`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub pair: String,
    pub interval: String,
    pub backtest: BacktestConfig,
    pub analyzer: AnalyzerConfig,
    pub sizing: SizingConfig,
    pub exits: ExitConfig,
    pub governor: GovernorConfig,
}

/// A combined signal seen during the walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: SignalType,
    pub price: f64,
    pub source: SignalSource,
    pub strength: f64,
    pub rsi: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub params: SimulationConfig,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub trades: Vec<Trade>,
    pub signals: Vec<SignalRecord>,
    pub equity: Vec<EquityPoint>,
    pub metrics: Metrics,
    /// Governor status at the end of the run, when one was attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskStatus>,
}

/// Source of per-candle analyses for the walk.
pub trait SignalProvider {
    /// Called once with the full candle series before the walk starts.
    fn prepare(&mut self, candles: &[Candle]);

    /// First index that can be analysed.
    fn warmup(&self) -> usize;

    /// Analysis of `index`, using nothing after it.
    fn analyze(&self, candles: &[Candle], index: usize) -> Option<Analysis>;
}

/// Default provider: the full detector set over precomputed indicators.
pub struct AnalyzerProvider {
    analyzer: SignalAnalyzer,
    set: Option<IndicatorSet>,
}

impl AnalyzerProvider {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            analyzer: SignalAnalyzer::new(config),
            set: None,
        }
    }
}

impl SignalProvider for AnalyzerProvider {
    fn prepare(&mut self, candles: &[Candle]) {
        // Every indicator is causal, so one pass over the whole series gives
        // the same values a candle-by-candle recomputation would.
        self.set = Some(IndicatorSet::compute(candles, self.analyzer.indicator_config()));
    }

    fn warmup(&self) -> usize {
        self.set.as_ref().map(IndicatorSet::warmup).unwrap_or(0)
    }

    fn analyze(&self, candles: &[Candle], index: usize) -> Option<Analysis> {
        let set = self.set.as_ref()?;
        self.analyzer.analyze(candles, set, index)
    }
}

/// Net P&L, commission and return (percent of size) for closing `size` of
/// notional opened at `entry` and closed at `exit`. Commission is charged
/// on both legs.
pub fn calculate_pnl(side: Side, entry: f64, exit: f64, size: f64, commission_rate: f64) -> (f64, f64, f64) {
    let gross = if entry > 0.0 {
        size * side.sign() * (exit - entry) / entry
    } else {
        0.0
    };
    let commission = size * commission_rate * 2.0;
    let pnl = gross - commission;
    let return_pct = if size > 0.0 { pnl / size * 100.0 } else { 0.0 };
    (pnl, commission, return_pct)
}

/// The combined signal of `analysis` and its side, if it clears the entry
/// threshold and every entry filter. Shared by backtests and live
/// suggestions.
pub fn entry_signal<'a>(config: &BacktestConfig, analysis: &'a Analysis) -> Option<(Side, &'a Signal)> {
    let signal = analysis.combined.as_ref()?;
    let side = signal.side()?;
    if signal.strength < config.entry_threshold {
        return None;
    }

    let snap = &analysis.snapshot;
    if snap.adx.map_or(true, |adx| adx < config.min_adx) {
        debug!(adx = ?snap.adx, "Entry filtered: ADX");
        return None;
    }
    if snap.volume_ratio.map_or(true, |v| v < config.min_volume_ratio) {
        debug!(volume_ratio = ?snap.volume_ratio, "Entry filtered: volume");
        return None;
    }
    if config.require_momentum {
        // the opposing move must be fading: RSI turning toward the signal
        let turning = match (snap.prev_rsi, snap.rsi, side) {
            (Some(prev), Some(cur), Side::Long) => cur > prev,
            (Some(prev), Some(cur), Side::Short) => cur < prev,
            _ => false,
        };
        if !turning {
            debug!("Entry filtered: momentum not turning");
            return None;
        }
    }
    if !config.quality.passes(signal.strength, signal.confirmations) {
        debug!(
            strength = signal.strength,
            confirmations = signal.confirmations,
            "Entry filtered: signal quality"
        );
        return None;
    }
    Some((side, signal))
}

/// Run the default detector set over `candles`.
pub fn simulate(
    candles: &[Candle],
    config: &SimulationConfig,
    cancel: Option<&CancellationToken>,
) -> Result<BacktestResult> {
    let mut provider = AnalyzerProvider::new(&config.analyzer);
    simulate_with(candles, config, &mut provider, cancel)
}

/// Run the walk with a custom signal provider.
pub fn simulate_with<P: SignalProvider>(
    candles: &[Candle],
    config: &SimulationConfig,
    provider: &mut P,
    cancel: Option<&CancellationToken>,
) -> Result<BacktestResult> {
    let need = config.backtest.min_candles;
    if candles.len() < need {
        return Err(Error::InsufficientData {
            have: candles.len(),
            need,
        });
    }

    let candles: Vec<Candle> = candles
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            if c.is_valid() {
                Some(*c)
            } else {
                warn!(index = i, ts = %c.timestamp, "Skipping invalid candle");
                None
            }
        })
        .collect();
    if candles.len() < need {
        return Err(Error::InsufficientData {
            have: candles.len(),
            need,
        });
    }
    if candles.windows(2).any(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(Error::InvalidInput(
            "candles must be strictly ascending by timestamp".into(),
        ));
    }

    provider.prepare(&candles);
    let warmup = provider.warmup();
    if warmup >= candles.len() {
        return Err(Error::InsufficientData {
            have: candles.len(),
            need: warmup + 1,
        });
    }

    let mut sim = Simulation::new(config);
    info!(
        pair = %config.pair,
        candles = candles.len(),
        warmup,
        "Backtest starting"
    );

    for index in warmup..candles.len() {
        if cancel.is_some_and(|t| t.is_cancelled()) {
            warn!(index, "Backtest cancelled");
            return Err(Error::Cancelled);
        }
        sim.step(&candles, index, provider);
    }

    let (first, last) = match (candles.get(warmup), candles.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => {
            return Err(Error::InsufficientData {
                have: candles.len(),
                need: warmup + 1,
            })
        }
    };
    sim.force_close(&last);

    let metrics = Metrics::compute(
        config.backtest.initial_balance,
        sim.balance,
        &sim.trades,
        &sim.equity,
    );
    info!(
        pair = %config.pair,
        trades = metrics.total_trades,
        total_return = metrics.total_return,
        max_drawdown = metrics.max_drawdown,
        "Backtest finished"
    );

    Ok(BacktestResult {
        params: config.clone(),
        start_time: first.timestamp,
        end_time: last.timestamp,
        risk: sim.governor.as_ref().map(RiskGovernor::status),
        trades: sim.trades,
        signals: sim.signals,
        equity: sim.equity,
        metrics,
    })
}

struct OpenPosition {
    position: Position,
    exposure: Option<ExposureId>,
}

struct Simulation<'a> {
    config: &'a SimulationConfig,
    sizer: PositionSizer,
    exits: ExitPolicy,
    governor: Option<RiskGovernor>,
    balance: f64,
    open: Option<OpenPosition>,
    last_exit: Option<usize>,
    last_time: Option<DateTime<Utc>>,
    trades: Vec<Trade>,
    signals: Vec<SignalRecord>,
    equity: Vec<EquityPoint>,
}

impl<'a> Simulation<'a> {
    fn new(config: &'a SimulationConfig) -> Self {
        let balance = config.backtest.initial_balance;
        Self {
            config,
            sizer: PositionSizer::new(config.sizing.clone()),
            exits: ExitPolicy::new(config.exits.clone()),
            governor: config
                .backtest
                .use_governor
                .then(|| RiskGovernor::new(config.governor.clone(), balance)),
            balance,
            open: None,
            last_exit: None,
            last_time: None,
            trades: Vec::new(),
            signals: Vec::new(),
            equity: Vec::new(),
        }
    }

    fn step<P: SignalProvider>(&mut self, candles: &[Candle], index: usize, provider: &P) {
        let candle = candles[index];
        self.rollover(candle.timestamp);

        if let Some(open) = self.open.as_mut() {
            if let ExitDecision::Exit { reason, price } =
                self.exits.evaluate(&mut open.position, &candle, index)
            {
                self.close(price, reason, candle.timestamp);
                self.last_exit = Some(index);
            }
        }

        match provider.analyze(candles, index) {
            Some(analysis) => {
                if let Some(signal) = &analysis.combined {
                    self.signals.push(SignalRecord {
                        timestamp: candle.timestamp,
                        kind: signal.kind,
                        price: candle.close,
                        source: signal.source,
                        strength: signal.strength,
                        rsi: analysis.snapshot.rsi,
                    });
                }
                if self.open.is_none() && self.cooled_down(index) {
                    self.try_enter(&analysis, &candle, index);
                }
            }
            None => warn!(index, "No analysis for candle, skipping entry decision"),
        }

        let unrealized = self
            .open
            .as_ref()
            .map(|o| o.position.unrealized_pnl(candle.close))
            .unwrap_or(0.0);
        self.equity.push(EquityPoint {
            timestamp: candle.timestamp,
            value: self.balance + unrealized,
        });
    }

    fn cooled_down(&self, index: usize) -> bool {
        self.last_exit
            .map_or(true, |last| index - last >= self.config.backtest.cooldown)
    }

    fn try_enter(&mut self, analysis: &Analysis, candle: &Candle, index: usize) {
        let Some((side, signal)) = entry_signal(&self.config.backtest, analysis) else {
            return;
        };
        let snap = &analysis.snapshot;

        let sized = match self.sizer.size(self.balance, candle.close, signal, snap.rsi) {
            Ok(s) => s,
            Err(e) => {
                warn!(index, error = %e, "Sizing failed, no trade");
                return;
            }
        };
        let Some(atr) = snap.atr else {
            warn!(index, "No ATR at entry, no trade");
            return;
        };
        let levels = match self.exits.levels(side, candle.close, atr) {
            Ok(l) => l,
            Err(e) => {
                warn!(index, error = %e, "Exit levels invalid, no trade");
                return;
            }
        };

        let exposure = match self.governor.as_mut() {
            Some(gov) => {
                let request = TradeRequest {
                    pair: self.config.pair.clone(),
                    side,
                    notional: sized.size,
                    risk_amount: sized.size * levels.stop_distance,
                };
                match gov.register_open(request) {
                    Ok(id) => Some(id),
                    Err(_) => return,
                }
            }
            None => None,
        };

        debug!(
            index,
            side = %side,
            price = candle.close,
            size = sized.size,
            leverage = sized.leverage,
            "Position opened"
        );
        self.open = Some(OpenPosition {
            position: Position {
                side,
                entry_price: candle.close,
                size: sized.size,
                leverage: sized.leverage,
                stop_loss: levels.stop_loss,
                take_profit: levels.take_profit,
                entry_index: index,
                entry_time: candle.timestamp,
                target_distance: levels.target_distance,
                trailing_active: false,
            },
            exposure,
        });
    }

    fn close(&mut self, price: f64, reason: ExitReason, time: DateTime<Utc>) {
        let Some(open) = self.open.take() else {
            return;
        };
        let pos = open.position;
        let (pnl, commission, return_pct) = calculate_pnl(
            pos.side,
            pos.entry_price,
            price,
            pos.size,
            self.config.backtest.commission_rate,
        );
        self.balance += pnl;
        if let Some(gov) = self.governor.as_mut() {
            match open.exposure {
                Some(id) => {
                    gov.record_close(id, pnl);
                }
                None => gov.record_trade_result(pnl),
            }
        }
        debug!(reason = %reason, price, pnl, "Position closed");
        self.trades.push(Trade {
            side: pos.side,
            entry_price: pos.entry_price,
            exit_price: price,
            entry_time: pos.entry_time,
            exit_time: time,
            pnl,
            position_size: pos.size,
            return_pct,
            commission,
            exit_reason: reason,
        });
    }

    fn force_close(&mut self, last: &Candle) {
        if self.open.is_some() {
            info!(price = last.close, "Force-closing open position at end of run");
            self.close(last.close, ExitReason::Time, last.timestamp);
        }
    }

    /// Daily and weekly governor resets on UTC calendar boundaries.
    fn rollover(&mut self, now: DateTime<Utc>) {
        let previous = self.last_time.replace(now);
        let (Some(gov), Some(prev)) = (self.governor.as_mut(), previous) else {
            return;
        };
        if now.date_naive() != prev.date_naive() {
            gov.daily_reset();
        }
        if now.iso_week() != prev.iso_week() {
            gov.weekly_reset();
        }
    }
}
