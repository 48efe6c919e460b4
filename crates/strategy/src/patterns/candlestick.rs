use serde::{Deserialize, Serialize};

use common::{Candle, Signal, SignalSource, SignalType};

use super::{Detector, MarketContext};

/// Hammer, shooting star and engulfing rules on body vs. wick geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandlestickConfig {
    /// Long wick must be at least this multiple of the body.
    pub wick_body_ratio: f64,
    /// Opposite wick may be at most this multiple of the body.
    pub max_opposite_wick: f64,
    /// Body must be at least this fraction of the range (rejects dojis).
    pub min_body_fraction: f64,
    pub hammer_strength: f64,
    pub engulfing_strength: f64,
    pub confidence: f64,
    /// Strength added per unit of wick (or engulfed body) beyond the minimum.
    pub excess_step: f64,
    /// Excess units counted at most.
    pub excess_cap: f64,
}

impl Default for CandlestickConfig {
    fn default() -> Self {
        Self {
            wick_body_ratio: 2.0,
            max_opposite_wick: 0.5,
            min_body_fraction: 0.05,
            hammer_strength: 0.55,
            engulfing_strength: 0.65,
            confidence: 0.5,
            excess_step: 0.05,
            excess_cap: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandlestickShape {
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
}

impl CandlestickShape {
    pub fn direction(&self) -> SignalType {
        match self {
            CandlestickShape::Hammer | CandlestickShape::BullishEngulfing => SignalType::Bullish,
            CandlestickShape::ShootingStar | CandlestickShape::BearishEngulfing => {
                SignalType::Bearish
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CandlestickDetector {
    pub config: CandlestickConfig,
}

impl CandlestickDetector {
    pub fn new(config: CandlestickConfig) -> Self {
        Self { config }
    }

    /// Classify the current candle. Engulfing patterns take precedence over
    /// single-candle shapes.
    pub fn classify(&self, prev: Option<&Candle>, cur: &Candle) -> Option<CandlestickShape> {
        if let Some(prev) = prev {
            if prev.is_bearish()
                && cur.is_bullish()
                && cur.open <= prev.close
                && cur.close >= prev.open
                && cur.body() > prev.body()
            {
                return Some(CandlestickShape::BullishEngulfing);
            }
            if prev.is_bullish()
                && cur.is_bearish()
                && cur.open >= prev.close
                && cur.close <= prev.open
                && cur.body() > prev.body()
            {
                return Some(CandlestickShape::BearishEngulfing);
            }
        }

        let range = cur.range();
        let body = cur.body();
        if range <= 0.0 || body < self.config.min_body_fraction * range {
            return None;
        }
        let cfg = &self.config;
        if cur.lower_wick() >= cfg.wick_body_ratio * body
            && cur.upper_wick() <= cfg.max_opposite_wick * body
        {
            return Some(CandlestickShape::Hammer);
        }
        if cur.upper_wick() >= cfg.wick_body_ratio * body
            && cur.lower_wick() <= cfg.max_opposite_wick * body
        {
            return Some(CandlestickShape::ShootingStar);
        }
        None
    }
}

impl Detector for CandlestickDetector {
    fn name(&self) -> &str {
        "candlestick"
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Option<Signal> {
        let cur = ctx.current()?;
        let shape = self.classify(ctx.previous(), cur)?;
        let cfg = &self.config;
        let (base, excess) = match shape {
            CandlestickShape::BullishEngulfing | CandlestickShape::BearishEngulfing => {
                let prev_body = ctx.previous().map(|p| p.body()).unwrap_or(0.0);
                // engulfing a doji counts as the largest cover
                let excess = if prev_body > 0.0 {
                    cur.body() / prev_body - 1.0
                } else {
                    cfg.excess_cap
                };
                (cfg.engulfing_strength, excess)
            }
            CandlestickShape::Hammer => (
                cfg.hammer_strength,
                cur.lower_wick() / cur.body() - cfg.wick_body_ratio,
            ),
            CandlestickShape::ShootingStar => (
                cfg.hammer_strength,
                cur.upper_wick() / cur.body() - cfg.wick_body_ratio,
            ),
        };
        let strength = base + cfg.excess_step * excess.clamp(0.0, cfg.excess_cap);
        Some(Signal::new(
            shape.direction(),
            SignalSource::Candlestick,
            strength,
            self.config.confidence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::fixtures::candle;

    #[test]
    fn hammer() {
        let det = CandlestickDetector::default();
        // body 1, lower wick 4, upper wick 0.2
        let c = candle(1, 100.0, 101.2, 96.0, 101.0, 1.0);
        assert_eq!(det.classify(None, &c), Some(CandlestickShape::Hammer));
    }

    #[test]
    fn shooting_star() {
        let det = CandlestickDetector::default();
        let c = candle(1, 101.0, 105.0, 99.8, 100.0, 1.0);
        assert_eq!(det.classify(None, &c), Some(CandlestickShape::ShootingStar));
    }

    #[test]
    fn engulfing_beats_single_candle_shapes() {
        let det = CandlestickDetector::default();
        let prev = candle(0, 101.0, 101.5, 99.5, 100.0, 1.0);
        let cur = candle(1, 99.8, 102.5, 99.5, 102.0, 1.0);
        assert_eq!(
            det.classify(Some(&prev), &cur),
            Some(CandlestickShape::BullishEngulfing)
        );

        let prev = candle(0, 100.0, 101.5, 99.5, 101.0, 1.0);
        let cur = candle(1, 101.2, 101.5, 98.5, 99.0, 1.0);
        assert_eq!(
            det.classify(Some(&prev), &cur),
            Some(CandlestickShape::BearishEngulfing)
        );
    }

    #[test]
    fn doji_is_ignored() {
        let det = CandlestickDetector::default();
        let c = candle(1, 100.0, 103.0, 97.0, 100.01, 1.0);
        assert_eq!(det.classify(None, &c), None);
    }

    #[test]
    fn detector_emits_signal_in_unit_range() {
        let det = CandlestickDetector::default();
        let candles = vec![
            candle(0, 101.0, 101.5, 99.5, 100.0, 1.0),
            candle(1, 99.8, 102.5, 99.5, 102.0, 1.0),
        ];
        let ctx = MarketContext {
            candles: &candles,
            rsi: &[],
            sma_short: &[],
            sma_long: &[],
        };
        let sig = det.detect(&ctx).unwrap();
        assert_eq!(sig.kind, SignalType::Bullish);
        assert_eq!(sig.source, SignalSource::Candlestick);
        assert!(sig.strength > 0.65 && sig.strength <= 1.0);
    }

    #[test]
    fn wick_excess_bonus_follows_config() {
        // lower wick 4 on body 1: two units past the 2x minimum
        let candles = vec![candle(1, 100.0, 101.2, 96.0, 101.0, 1.0)];
        let ctx = MarketContext {
            candles: &candles,
            rsi: &[],
            sma_short: &[],
            sma_long: &[],
        };
        let sig = CandlestickDetector::default().detect(&ctx).unwrap();
        assert!((sig.strength - 0.65).abs() < 1e-9, "{}", sig.strength);

        let capped = CandlestickDetector::new(CandlestickConfig {
            excess_step: 0.1,
            excess_cap: 1.0,
            ..CandlestickConfig::default()
        });
        let sig = capped.detect(&ctx).unwrap();
        assert!((sig.strength - 0.65).abs() < 1e-9, "{}", sig.strength);
    }
}
