use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar. Series are ordered by `timestamp` ascending with no
/// duplicate timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// True when every price and the volume are finite, prices are positive
    /// and `high >= low`.
    pub fn is_valid(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.high >= self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Candle update from a live kline stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleEvent {
    pub pair: String,
    pub candle: Candle,
    /// Only closed candles feed the rolling windows.
    pub is_closed: bool,
}

/// A single timestamped numeric observation (price or indicator value).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Bullish => write!(f, "bullish"),
            SignalType::Bearish => write!(f, "bearish"),
            SignalType::Neutral => write!(f, "neutral"),
        }
    }
}

/// Detector that produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Divergence,
    Wm,
    Volume,
    Candlestick,
    Trend,
    RsiExtreme,
    Combined,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::Divergence => write!(f, "divergence"),
            SignalSource::Wm => write!(f, "wm"),
            SignalSource::Volume => write!(f, "volume"),
            SignalSource::Candlestick => write!(f, "candlestick"),
            SignalSource::Trend => write!(f, "trend"),
            SignalSource::RsiExtreme => write!(f, "rsi_extreme"),
            SignalSource::Combined => write!(f, "combined"),
        }
    }
}

/// Candidate or combined trade signal.
///
/// `strength` measures the pattern magnitude, `confidence` the detector's
/// reliability. Both are kept in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(rename = "type")]
    pub kind: SignalType,
    pub strength: f64,
    pub confidence: f64,
    pub source: SignalSource,
    pub confirmations: u32,
}

impl Signal {
    pub fn new(kind: SignalType, source: SignalSource, strength: f64, confidence: f64) -> Self {
        Self {
            kind,
            strength: clamp_unit(strength),
            confidence: clamp_unit(confidence),
            source,
            confirmations: 1,
        }
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn side(&self) -> Option<Side> {
        match self.kind {
            SignalType::Bullish => Some(Side::Long),
            SignalType::Bearish => Some(Side::Short),
            SignalType::Neutral => None,
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Side of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// An open simulated position. `size` is the notional in quote currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub leverage: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    /// Target distance as a fraction of entry price, fixed at entry.
    pub target_distance: f64,
    pub trailing_active: bool,
}

impl Position {
    /// Gross mark-to-market P&L at `price`, before commission.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.size * self.side.sign() * (price - self.entry_price) / self.entry_price
    }

    /// Unrealized return as a fraction of entry price.
    pub fn profit_fraction(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.side.sign() * (price - self.entry_price) / self.entry_price
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitReason {
    Target,
    Stop,
    Time,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Target => write!(f, "TARGET"),
            ExitReason::Stop => write!(f, "STOP"),
            ExitReason::Time => write!(f, "TIME"),
        }
    }
}

/// A closed position. Created exactly once per position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl: f64,
    pub position_size: f64,
    /// Net P&L as a percentage of `position_size`.
    pub return_pct: f64,
    pub commission: f64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Per-session risk bookkeeping owned by the risk governor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskState {
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    /// Realized P&L since the session started (or the last emergency reset).
    pub session_pnl: f64,
    pub emergency_stop_triggered: bool,
    pub daily_loss_limit_reached: bool,
    pub open_positions: usize,
}

/// Reason a trade was refused by the risk governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    EmergencyStop,
    DailyLossLimit,
    MaxOpenPositions { limit: usize },
    ConcentrationLimit { fraction: f64, limit: f64 },
    Correlated { pair: String, correlation: f64 },
    InvalidRequest(String),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::EmergencyStop => write!(f, "Emergency stop activated"),
            RejectionReason::DailyLossLimit => write!(f, "Daily loss limit reached"),
            RejectionReason::MaxOpenPositions { limit } => {
                write!(f, "Maximum open positions reached ({limit})")
            }
            RejectionReason::ConcentrationLimit { fraction, limit } => write!(
                f,
                "Asset concentration {:.1}% exceeds limit {:.1}%",
                fraction * 100.0,
                limit * 100.0
            ),
            RejectionReason::Correlated { pair, correlation } => {
                write!(f, "Too correlated with open position on {pair} ({correlation:.2})")
            }
            RejectionReason::InvalidRequest(s) => write!(f, "Invalid trade request: {s}"),
        }
    }
}

/// Whether a result was computed from exchange data or the synthetic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Exchange,
    Synthetic,
}

impl std::fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataOrigin::Exchange => write!(f, "exchange"),
            DataOrigin::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Whether the process runs a one-shot backtest or the live signal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Backtest,
    Live,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Backtest => write!(f, "backtest"),
            RunMode::Live => write!(f, "live"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn candle_geometry() {
        let c = candle(100.0, 110.0, 90.0, 105.0);
        assert!((c.body() - 5.0).abs() < 1e-12);
        assert!((c.upper_wick() - 5.0).abs() < 1e-12);
        assert!((c.lower_wick() - 10.0).abs() < 1e-12);
        assert!(c.is_bullish());
        assert!(c.is_valid());
    }

    #[test]
    fn candle_rejects_inverted_range_and_nan() {
        assert!(!candle(100.0, 90.0, 110.0, 100.0).is_valid());
        assert!(!candle(f64::NAN, 110.0, 90.0, 100.0).is_valid());
        assert!(!candle(0.0, 110.0, 90.0, 100.0).is_valid());
    }

    #[test]
    fn signal_clamps_strength_and_confidence() {
        let s = Signal::new(SignalType::Bullish, SignalSource::Volume, 1.7, f64::NAN);
        assert_eq!(s.strength, 1.0);
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.confirmations, 1);
    }

    #[test]
    fn position_pnl_is_signed_by_side() {
        let mut p = Position {
            side: Side::Long,
            entry_price: 100.0,
            size: 1000.0,
            leverage: 1.0,
            stop_loss: 95.0,
            take_profit: 110.0,
            entry_index: 0,
            entry_time: Utc.timestamp_opt(0, 0).unwrap(),
            target_distance: 0.1,
            trailing_active: false,
        };
        assert!((p.unrealized_pnl(110.0) - 100.0).abs() < 1e-9);
        p.side = Side::Short;
        assert!((p.unrealized_pnl(110.0) + 100.0).abs() < 1e-9);
    }

    #[test]
    fn emergency_rejection_message() {
        assert_eq!(
            RejectionReason::EmergencyStop.to_string(),
            "Emergency stop activated"
        );
    }
}
