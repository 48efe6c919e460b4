use serde::{Deserialize, Serialize};

use common::{Signal, SignalSource, SignalType};

use super::{Detector, MarketContext};
use crate::extrema::{find_extrema, ExtremePoint, ExtremumKind};

/// W (double bottom) / M (double top) shapes in RSI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WmConfig {
    pub oversold: f64,
    pub overbought: f64,
    /// Extremes within `tolerance` of the zone still count.
    pub tolerance: f64,
    pub order: usize,
    /// Number of most recent RSI points searched.
    pub lookback: usize,
    pub base_strength: f64,
    pub base_confidence: f64,
    /// Confidence added when a second extreme completes the W or M.
    pub double_bonus: f64,
}

impl Default for WmConfig {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
            tolerance: 5.0,
            order: 2,
            lookback: 12,
            base_strength: 0.4,
            base_confidence: 0.55,
            double_bonus: 0.15,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WmDetector {
    pub config: WmConfig,
}

impl WmDetector {
    pub fn new(config: WmConfig) -> Self {
        Self { config }
    }

    fn bullish(&self, troughs: &[ExtremePoint]) -> Option<(usize, Signal)> {
        let threshold = self.config.oversold + self.config.tolerance;
        let last = troughs.last().filter(|t| t.value < threshold)?;
        let depth = ((threshold - last.value) / threshold).clamp(0.0, 1.0);
        let mut signal = Signal::new(
            SignalType::Bullish,
            SignalSource::Wm,
            self.config.base_strength + depth,
            self.config.base_confidence,
        );
        if let [.., prev, _] = troughs {
            if prev.value < threshold && last.value > prev.value {
                signal.confidence = (signal.confidence + self.config.double_bonus).min(1.0);
                signal.confirmations = 2;
            }
        }
        Some((last.index, signal))
    }

    fn bearish(&self, peaks: &[ExtremePoint]) -> Option<(usize, Signal)> {
        let threshold = self.config.overbought - self.config.tolerance;
        let last = peaks.last().filter(|p| p.value > threshold)?;
        let height = ((last.value - threshold) / (100.0 - threshold).max(1.0)).clamp(0.0, 1.0);
        let mut signal = Signal::new(
            SignalType::Bearish,
            SignalSource::Wm,
            self.config.base_strength + height,
            self.config.base_confidence,
        );
        if let [.., prev, _] = peaks {
            if prev.value > threshold && last.value < prev.value {
                signal.confidence = (signal.confidence + self.config.double_bonus).min(1.0);
                signal.confirmations = 2;
            }
        }
        Some((last.index, signal))
    }
}

impl Detector for WmDetector {
    fn name(&self) -> &str {
        "rsi-wm"
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Option<Signal> {
        let start = ctx.rsi.len().saturating_sub(self.config.lookback);
        let window = &ctx.rsi[start..];
        let troughs = find_extrema(window, ExtremumKind::Trough, self.config.order);
        let peaks = find_extrema(window, ExtremumKind::Peak, self.config.order);

        match (self.bullish(&troughs), self.bearish(&peaks)) {
            (Some((bi, b)), Some((si, s))) => Some(if bi >= si { b } else { s }),
            (b, s) => b.or(s).map(|(_, sig)| sig),
        }
    }
}
