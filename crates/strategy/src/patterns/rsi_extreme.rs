use serde::{Deserialize, Serialize};

use common::{Signal, SignalSource, SignalType};

use super::{Detector, MarketContext};
use crate::config::IndicatorConfig;
use crate::indicators::{RsiIndicator, RsiZone};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiExtremeConfig {
    pub oversold: f64,
    pub overbought: f64,
    pub base_strength: f64,
    pub confidence: f64,
    /// RSI points beyond the threshold that add 1.0 to the strength.
    pub depth_scale: f64,
}

impl Default for RsiExtremeConfig {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
            base_strength: 0.3,
            confidence: 0.4,
            depth_scale: 30.0,
        }
    }
}

/// Plain oversold / overbought reading on the latest RSI value.
#[derive(Debug, Clone)]
pub struct RsiExtremeDetector {
    indicator: RsiIndicator,
    config: RsiExtremeConfig,
}

impl RsiExtremeDetector {
    /// `rsi_period` must match the period of the RSI series fed to `detect`.
    pub fn new(config: RsiExtremeConfig, rsi_period: usize) -> Self {
        Self {
            indicator: RsiIndicator::new(rsi_period, config.overbought, config.oversold),
            config,
        }
    }

    pub fn rsi_period(&self) -> usize {
        self.indicator.period
    }
}

impl Default for RsiExtremeDetector {
    fn default() -> Self {
        Self::new(RsiExtremeConfig::default(), IndicatorConfig::default().rsi_period)
    }
}

impl Detector for RsiExtremeDetector {
    fn name(&self) -> &str {
        "rsi-extreme"
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Option<Signal> {
        let rsi = ctx.rsi.last()?.value;
        let (kind, excess) = match self.indicator.zone(rsi) {
            RsiZone::Oversold => (SignalType::Bullish, self.config.oversold - rsi),
            RsiZone::Overbought => (SignalType::Bearish, rsi - self.config.overbought),
            RsiZone::Neutral => return None,
        };
        let depth = if self.config.depth_scale > 0.0 {
            excess / self.config.depth_scale
        } else {
            0.0
        };
        Some(Signal::new(
            kind,
            SignalSource::RsiExtreme,
            self.config.base_strength + depth.max(0.0),
            self.config.confidence,
        ))
    }
}
