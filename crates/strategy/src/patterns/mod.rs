//! Independent reversal / continuation heuristics. Each detector looks at the
//! history ending on the current candle and emits at most one [`Signal`].
//!
//! Strengths and confidences are tunable heuristics, not derived quantities;
//! every constant lives in [`PatternConfig`].

pub mod candlestick;
pub mod rsi_extreme;
pub mod trend;
pub mod volume;
pub mod wm;

use serde::{Deserialize, Serialize};

use common::{Candle, SeriesPoint, Signal};

pub use candlestick::{CandlestickConfig, CandlestickDetector};
pub use rsi_extreme::{RsiExtremeConfig, RsiExtremeDetector};
pub use trend::{TrendConfig, TrendFollowDetector};
pub use volume::{volume_ratio, VolumeSpikeConfig, VolumeSpikeDetector};
pub use wm::{WmConfig, WmDetector};

/// Market history visible to detectors at one point in time. Every slice ends
/// on the current candle; indicator slices are suffix-aligned to `candles`.
#[derive(Debug, Clone, Copy)]
pub struct MarketContext<'a> {
    pub candles: &'a [Candle],
    pub rsi: &'a [SeriesPoint],
    pub sma_short: &'a [f64],
    pub sma_long: &'a [f64],
}

impl<'a> MarketContext<'a> {
    pub fn current(&self) -> Option<&'a Candle> {
        self.candles.last()
    }

    pub fn previous(&self) -> Option<&'a Candle> {
        self.candles.len().checked_sub(2).map(|i| &self.candles[i])
    }

    /// Latest and previous RSI values.
    pub fn rsi_pair(&self) -> Option<(f64, f64)> {
        match self.rsi {
            [.., prev, cur] => Some((prev.value, cur.value)),
            _ => None,
        }
    }
}

/// All pattern detectors must satisfy this trait.
pub trait Detector: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Evaluate the context and optionally emit a candidate signal.
    fn detect(&self, ctx: &MarketContext<'_>) -> Option<Signal>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub wm: WmConfig,
    pub volume: VolumeSpikeConfig,
    pub candlestick: CandlestickConfig,
    pub trend: TrendConfig,
    pub rsi_extreme: RsiExtremeConfig,
}
