//! RSI divergence detection.
//!
//! Pairs the two most recent same-kind price extrema inside the recency
//! window with indicator extrema whose timestamps fall within a tolerance,
//! and reports a bullish (lower price low, higher indicator low) or bearish
//! (higher price high, lower indicator high) divergence.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{SeriesPoint, Signal, SignalSource, SignalType};

use crate::extrema::{find_extrema, ExtremePoint, ExtremumKind};
use crate::patterns::{Detector, MarketContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceConfig {
    /// Neighbours on each side required for an extreme.
    pub order: usize,
    /// Only the most recent `lookback` price points are searched.
    pub lookback: usize,
    /// Maximum timestamp gap between a price extreme and its indicator match.
    pub tolerance_secs: i64,
    /// Price move (percent) that maps to full price-side confidence.
    pub price_norm_pct: f64,
    /// Indicator move (points) that maps to full indicator-side confidence.
    pub indicator_norm: f64,
    /// Divisor applied to `|price %| + |indicator change|` for strength.
    pub strength_divisor: f64,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            order: 2,
            lookback: 40,
            tolerance_secs: 300,
            price_norm_pct: 2.0,
            indicator_norm: 10.0,
            strength_divisor: 20.0,
        }
    }
}

/// A matched divergence between two price extrema and two indicator extrema.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub kind: SignalType,
    pub price: (ExtremePoint, ExtremePoint),
    pub indicator: (ExtremePoint, ExtremePoint),
    pub strength: f64,
    pub confidence: f64,
}

impl Divergence {
    pub fn signal(&self) -> Signal {
        Signal::new(self.kind, SignalSource::Divergence, self.strength, self.confidence)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DivergenceDetector {
    pub config: DivergenceConfig,
}

impl DivergenceDetector {
    pub fn new(config: DivergenceConfig) -> Self {
        Self { config }
    }

    /// Detect a divergence between `price` and `indicator` (both oldest first).
    pub fn detect(&self, price: &[SeriesPoint], indicator: &[SeriesPoint]) -> Option<Signal> {
        self.find(price, indicator).map(|d| d.signal())
    }

    /// Like [`detect`](Self::detect) but returns the matched extrema too.
    pub fn find(&self, price: &[SeriesPoint], indicator: &[SeriesPoint]) -> Option<Divergence> {
        let start = price.len().saturating_sub(self.config.lookback);
        let price = &price[start..];
        let first_ts = price.first()?.timestamp - self.tolerance();
        let ind_start = indicator.partition_point(|p| p.timestamp < first_ts);
        let indicator = &indicator[ind_start..];

        let bullish = self.pair_extrema(price, indicator, ExtremumKind::Trough);
        let bearish = self.pair_extrema(price, indicator, ExtremumKind::Peak);

        match (bullish, bearish) {
            (Some(b), Some(s)) => {
                // both present: the one confirmed most recently wins
                if b.price.1.index >= s.price.1.index {
                    Some(b)
                } else {
                    Some(s)
                }
            }
            (b, s) => b.or(s),
        }
    }

    fn tolerance(&self) -> Duration {
        Duration::seconds(self.config.tolerance_secs.max(0))
    }

    fn pair_extrema(
        &self,
        price: &[SeriesPoint],
        indicator: &[SeriesPoint],
        kind: ExtremumKind,
    ) -> Option<Divergence> {
        let price_ext = find_extrema(price, kind, self.config.order);
        let ind_ext = find_extrema(indicator, kind, self.config.order);

        let [.., p1, p2] = price_ext.as_slice() else {
            return None;
        };
        let r1 = self.matching(p1, &ind_ext)?;
        let r2 = self.matching(p2, &ind_ext)?;
        if r1.index == r2.index {
            debug!("Divergence: both price extrema matched the same indicator extreme");
            return None;
        }

        let diverges = match kind {
            ExtremumKind::Trough => p2.value < p1.value && r2.value > r1.value,
            ExtremumKind::Peak => p2.value > p1.value && r2.value < r1.value,
        };
        if !diverges || p1.value <= 0.0 {
            return None;
        }

        let price_change_pct = (p2.value - p1.value) / p1.value * 100.0;
        let indicator_change = r2.value - r1.value;
        let strength =
            ((price_change_pct.abs() + indicator_change.abs()) / self.config.strength_divisor).min(1.0);
        let price_score = (price_change_pct.abs() / self.config.price_norm_pct).min(1.0);
        let indicator_score = (indicator_change.abs() / self.config.indicator_norm).min(1.0);
        let confidence = (price_score + indicator_score) / 2.0;

        Some(Divergence {
            kind: match kind {
                ExtremumKind::Trough => SignalType::Bullish,
                ExtremumKind::Peak => SignalType::Bearish,
            },
            price: (*p1, *p2),
            indicator: (r1, r2),
            strength,
            confidence,
        })
    }

    /// Indicator extreme closest in time to `point`, within the tolerance.
    fn matching(&self, point: &ExtremePoint, candidates: &[ExtremePoint]) -> Option<ExtremePoint> {
        let tolerance = self.config.tolerance_secs.max(0);
        let gap = |c: &ExtremePoint| (c.timestamp - point.timestamp).num_seconds().abs();
        candidates
            .iter()
            .filter(|c| gap(c) <= tolerance)
            .min_by_key(|c| gap(c))
            .copied()
    }
}

impl Detector for DivergenceDetector {
    fn name(&self) -> &str {
        "rsi-divergence"
    }

    fn detect(&self, ctx: &MarketContext<'_>) -> Option<Signal> {
        let price: Vec<SeriesPoint> = ctx
            .candles
            .iter()
            .map(|c| SeriesPoint {
                timestamp: c.timestamp,
                value: c.close,
            })
            .collect();
        DivergenceDetector::detect(self, &price, ctx.rsi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn series(values: &[f64]) -> Vec<SeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| SeriesPoint {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                value,
            })
            .collect()
    }

    /// 20 rising candles with one dip, then 5 candles undercutting that dip.
    fn bullish_fixture() -> (Vec<f64>, Vec<f64>) {
        let prices = vec![
            100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0, 108.0, 109.0, //
            110.0, 108.0, 106.0, 104.0, 106.0, 108.0, 110.0, 111.0, 112.0, 113.0, //
            109.0, 105.0, 102.0, 104.0, 106.0,
        ];
        let rsi = vec![
            60.0, 61.0, 62.0, 63.0, 64.0, 65.0, 66.0, 67.0, 68.0, 69.0, //
            70.0, 55.0, 40.0, 30.0, 42.0, 50.0, 58.0, 62.0, 64.0, 72.0, //
            55.0, 45.0, 36.0, 44.0, 50.0,
        ];
        (prices, rsi)
    }

    #[test]
    fn bullish_divergence_detected() {
        let (prices, rsi) = bullish_fixture();
        let det = DivergenceDetector::default();
        let d = det.find(&series(&prices), &series(&rsi)).expect("divergence");
        assert_eq!(d.kind, SignalType::Bullish);
        assert_eq!(d.price.0.index, 13);
        assert_eq!(d.price.1.index, 22);

        let sig = det.detect(&series(&prices), &series(&rsi)).unwrap();
        assert_eq!(sig.kind, SignalType::Bullish);
        assert_eq!(sig.source, SignalSource::Divergence);
        assert!(sig.strength > 0.0);
        // |(102-104)/104|*100 = 1.923, |36-30| = 6 -> (7.923)/20
        assert!((sig.strength - 0.3962).abs() < 1e-3, "{}", sig.strength);
    }

    #[test]
    fn bearish_divergence_detected() {
        let prices = vec![100.0, 102.0, 105.0, 102.0, 100.0, 103.0, 108.0, 104.0, 101.0];
        let rsi = vec![50.0, 60.0, 75.0, 60.0, 50.0, 60.0, 68.0, 58.0, 50.0];
        let det = DivergenceDetector::default();
        let sig = det.detect(&series(&prices), &series(&rsi)).unwrap();
        assert_eq!(sig.kind, SignalType::Bearish);
        assert!(sig.confidence > 0.0 && sig.confidence <= 1.0);
    }

    #[test]
    fn co_directional_extremes_are_not_divergence() {
        let (prices, mut rsi) = bullish_fixture();
        // indicator also makes a lower low
        rsi[22] = 25.0;
        let det = DivergenceDetector::default();
        assert!(det.detect(&series(&prices), &series(&rsi)).is_none());
    }

    #[test]
    fn unmatched_timestamps_yield_nothing() {
        let (prices, rsi) = bullish_fixture();
        let price_points = series(&prices);
        // shift the indicator by one hour so no extreme lines up
        let rsi_points: Vec<SeriesPoint> = series(&rsi)
            .into_iter()
            .map(|p| SeriesPoint {
                timestamp: p.timestamp + Duration::hours(1),
                value: p.value,
            })
            .collect();
        let det = DivergenceDetector::default();
        assert!(det.detect(&price_points, &rsi_points).is_none());
    }

    #[test]
    fn tolerance_is_configurable() {
        let (prices, rsi) = bullish_fixture();
        let rsi_points: Vec<SeriesPoint> = series(&rsi)
            .into_iter()
            .map(|p| SeriesPoint {
                timestamp: p.timestamp + Duration::seconds(90),
                value: p.value,
            })
            .collect();
        let strict = DivergenceDetector::new(DivergenceConfig {
            tolerance_secs: 60,
            ..DivergenceConfig::default()
        });
        let loose = DivergenceDetector::default();
        assert!(strict.detect(&series(&prices), &rsi_points).is_none());
        assert!(loose.detect(&series(&prices), &rsi_points).is_some());
    }
}
