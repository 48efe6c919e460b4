use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, SeriesPoint};
use strategy::indicators::{adx, atr, rsi, sma};
use strategy::{AnalyzerConfig, DivergenceConfig, DivergenceDetector, IndicatorSet, SignalAnalyzer};

fn prices() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(0.01f64..100_000.0, 0..200)
}

fn points(values: &[f64]) -> Vec<SeriesPoint> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| SeriesPoint {
            timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
            value,
        })
        .collect()
}

proptest! {
    /// Every RSI value lies in [0, 100].
    #[test]
    fn rsi_is_bounded(closes in prices(), period in 1usize..30) {
        for v in rsi(&closes, period) {
            prop_assert!((0.0..=100.0).contains(&v), "rsi out of range: {v}");
        }
    }

    /// Garbage entries are skipped rather than poisoning the output.
    #[test]
    fn rsi_ignores_non_finite_closes(
        closes in proptest::collection::vec(proptest::option::of(1.0f64..1_000.0), 0..120),
    ) {
        let with_nan: Vec<f64> = closes.iter().map(|c| c.unwrap_or(f64::NAN)).collect();
        let clean: Vec<f64> = closes.iter().flatten().copied().collect();
        prop_assert_eq!(rsi(&with_nan, 14), rsi(&clean, 14));
    }

    /// A strictly rising series has no losses, so RSI is pinned at 100.
    #[test]
    fn rising_series_reads_100(
        start in 1.0f64..1_000.0,
        steps in proptest::collection::vec(0.001f64..10.0, 15..80),
    ) {
        let mut closes = vec![start];
        for s in &steps {
            let next = closes[closes.len() - 1] + s;
            closes.push(next);
        }
        let values = rsi(&closes, 14);
        prop_assert!(!values.is_empty());
        prop_assert!(values.iter().all(|&v| v == 100.0));
    }

    /// Once every new change is a gain, RSI never decreases.
    #[test]
    fn rsi_never_falls_during_a_rally(
        prefix in proptest::collection::vec(50.0f64..150.0, 15..40),
        steps in proptest::collection::vec(0.001f64..5.0, 1..60),
    ) {
        let period = 14;
        let mut closes = prefix.clone();
        let rally_start = closes.len() - 1;
        for s in &steps {
            let next = closes[closes.len() - 1] + s;
            closes.push(next);
        }
        let values = rsi(&closes, period);
        // values[k] folds in the change ending at close `period + k`
        for k in 1..values.len() {
            if period + k - 1 >= rally_start {
                prop_assert!(values[k] >= values[k - 1], "rsi fell at {k}: {:?}", values);
            }
        }
    }

    /// ATR is non-negative and ADX stays in [0, 100].
    #[test]
    fn volatility_indicators_are_bounded(
        bars in proptest::collection::vec((1.0f64..1_000.0, 0.0f64..0.05, 0.0f64..1.0), 0..120),
        period in 1usize..20,
    ) {
        let closes: Vec<f64> = bars.iter().map(|b| b.0).collect();
        let highs: Vec<f64> = bars.iter().map(|b| b.0 * (1.0 + b.1)).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.0 * (1.0 - b.1 * b.2)).collect();
        for v in atr(&highs, &lows, &closes, period) {
            prop_assert!(v >= 0.0);
        }
        for v in adx(&highs, &lows, &closes, period) {
            prop_assert!((0.0..=100.0).contains(&v), "adx out of range: {v}");
        }
    }

    #[test]
    fn sma_length_matches_warmup(values in prices(), period in 1usize..30) {
        let out = sma(&values, period);
        if values.len() >= period {
            prop_assert_eq!(out.len(), values.len() - period + 1);
        } else {
            prop_assert!(out.is_empty());
        }
    }

    /// Price and RSI lows moving the same way are never a divergence.
    #[test]
    fn co_directional_lows_are_not_divergence(
        first_low in 50.0f64..100.0,
        drop in 0.5f64..20.0,
        rsi_first in 20.0f64..40.0,
        rsi_drop in 0.5f64..15.0,
    ) {
        let second_low = first_low - drop;
        let rsi_second = rsi_first - rsi_drop;
        let price = [
            first_low + 10.0, first_low + 5.0, first_low, first_low + 5.0, first_low + 10.0,
            first_low + 5.0, second_low, second_low + 5.0, second_low + 10.0,
        ];
        let osc = [
            rsi_first + 20.0, rsi_first + 10.0, rsi_first, rsi_first + 10.0, rsi_first + 20.0,
            rsi_first + 10.0, rsi_second, rsi_second + 10.0, rsi_second + 20.0,
        ];
        let detector = DivergenceDetector::new(DivergenceConfig::default());
        prop_assert!(detector.detect(&points(&price), &points(&osc)).is_none());
    }
}

/// Too little history is an empty series, not an error.
#[test]
fn rsi_with_ten_closes_is_empty() {
    let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
    assert!(rsi(&closes, 14).is_empty());
}

/// The analyzer sees the same thing at index `i` whether or not candles
/// after `i` exist.
#[test]
fn analysis_does_not_look_ahead() {
    let candles: Vec<Candle> = (0..160)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.25).sin() * 5.0 + i as f64 * 0.02;
            Candle {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i * 300, 0).unwrap(),
                open: close - 0.3,
                high: close + 1.2,
                low: close - 1.2,
                close,
                volume: 100.0 + (i % 7) as f64 * 40.0,
            }
        })
        .collect();

    let analyzer = SignalAnalyzer::new(&AnalyzerConfig::default());
    let full = IndicatorSet::compute(&candles, analyzer.indicator_config());
    for cut in [60usize, 90, 120, 159] {
        let prefix = &candles[..=cut];
        let partial = IndicatorSet::compute(prefix, analyzer.indicator_config());
        let a = analyzer.analyze(&candles, &full, cut).map(|a| (a.combined, a.snapshot));
        let b = analyzer.analyze(prefix, &partial, cut).map(|a| (a.combined, a.snapshot));
        assert_eq!(a, b, "lookahead at {cut}");
    }
}
