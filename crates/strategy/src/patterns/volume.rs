use serde::{Deserialize, Serialize};

use common::{Candle, Signal, SignalSource, SignalType};

use super::{Detector, MarketContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSpikeConfig {
    /// Number of preceding candles in the average.
    pub window: usize,
    /// Current / average volume must exceed this ratio.
    pub threshold: f64,
    pub base_confidence: f64,
    /// Body / range above which the candle counts as decisive.
    pub decisive_body: f64,
    pub decisive_bonus: f64,
}

impl Default for VolumeSpikeConfig {
    fn default() -> Self {
        Self {
            window: 4,
            threshold: 2.0,
            base_confidence: 0.5,
            decisive_body: 0.6,
            decisive_bonus: 0.1,
        }
    }
}

/// Volume of the last candle divided by the mean volume of the `window`
/// candles before it.
pub fn volume_ratio(candles: &[Candle], window: usize) -> Option<f64> {
    if window == 0 || candles.len() < window + 1 {
        return None;
    }
    let (current, history) = candles.split_last()?;
    let trailing = &history[history.len() - window..];
    let avg = trailing.iter().map(|c| c.volume).sum::<f64>() / window as f64;
    if avg <= 0.0 || !avg.is_finite() {
        return None;
    }
    Some(current.volume / avg)
}

#[derive(Debug, Clone, Default)]
pub struct VolumeSpikeDetector {
    pub config: VolumeSpikeConfig,
}

impl VolumeSpikeDetector {
    pub fn new(config: VolumeSpikeConfig) -> Self {
        Self { config }
    }
}

impl Detector for VolumeSpikeDetector {
    fn name(&self) -> &str {
        "volume-spike"
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Option<Signal> {
        let candle = ctx.current()?;
        let ratio = volume_ratio(ctx.candles, self.config.window)?;
        if ratio <= self.config.threshold {
            return None;
        }

        let kind = if candle.is_bullish() {
            SignalType::Bullish
        } else if candle.is_bearish() {
            SignalType::Bearish
        } else {
            return None;
        };

        let strength = ratio / (self.config.threshold * 2.0);
        let mut confidence = self.config.base_confidence;
        if candle.range() > 0.0 && candle.body() / candle.range() > self.config.decisive_body {
            confidence += self.config.decisive_bonus;
        }
        Some(Signal::new(kind, SignalSource::Volume, strength, confidence))
    }
}
