use serde::{Deserialize, Serialize};

use common::{Signal, SignalSource, SignalType};

use super::{Detector, MarketContext};

/// Short/long SMA trend with an RSI pullback whose opposite momentum is fading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Bullish entries need RSI at or below this level (a pullback).
    pub bullish_rsi_max: f64,
    /// Bearish entries need RSI at or above this level (a bounce).
    pub bearish_rsi_min: f64,
    pub base_strength: f64,
    /// Strength added per 1% of SMA spread.
    pub spread_weight: f64,
    /// Strength added when the SMAs crossed on this candle.
    pub crossover_bonus: f64,
    pub confidence: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            bullish_rsi_max: 40.0,
            bearish_rsi_min: 60.0,
            base_strength: 0.3,
            spread_weight: 0.1,
            crossover_bonus: 0.2,
            confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrendFollowDetector {
    pub config: TrendConfig,
}

impl TrendFollowDetector {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }
}

impl Detector for TrendFollowDetector {
    fn name(&self) -> &str {
        "trend-follow"
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Option<Signal> {
        let [.., short_prev, short] = ctx.sma_short else {
            return None;
        };
        let [.., long_prev, long] = ctx.sma_long else {
            return None;
        };
        let (rsi_prev, rsi) = ctx.rsi_pair()?;
        if *long <= 0.0 {
            return None;
        }

        let spread_pct = (short - long) / long * 100.0;
        let cfg = &self.config;

        let (kind, crossed) = if short > long && rsi <= cfg.bullish_rsi_max && rsi > rsi_prev {
            (SignalType::Bullish, short_prev <= long_prev)
        } else if short < long && rsi >= cfg.bearish_rsi_min && rsi < rsi_prev {
            (SignalType::Bearish, short_prev >= long_prev)
        } else {
            return None;
        };

        let mut strength = cfg.base_strength + cfg.spread_weight * spread_pct.abs();
        if crossed {
            strength += cfg.crossover_bonus;
        }
        Some(Signal::new(kind, SignalSource::Trend, strength, cfg.confidence))
    }
}
