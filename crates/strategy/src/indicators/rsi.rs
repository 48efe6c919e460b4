use tracing::debug;

use super::{positive_values, round8};

/// Wilder's smoothed RSI over `closes` (oldest first).
///
/// The first value is the simple average of the first `period` gains and
/// losses; each following value uses `avg = (avg * (period - 1) + x) / period`.
/// Returns `closes.len() - period` values, or an empty series when fewer than
/// `period + 1` valid closes are available.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let closes = positive_values(closes);
    if period == 0 || closes.len() < period + 1 {
        debug!(have = closes.len(), period, "RSI: insufficient data");
        return Vec::new();
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;

    let initial = &changes[..period];
    let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / p;
    let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / p;

    let mut out = Vec::with_capacity(changes.len() - period + 1);
    out.push(rsi_value(avg_gain, avg_loss));

    for &change in &changes[period..] {
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { change.abs() } else { 0.0 };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    round8(100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Where an RSI reading sits relative to the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiZone {
    Oversold,
    Neutral,
    Overbought,
}

/// RSI with its overbought/oversold thresholds.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl RsiIndicator {
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        Self {
            period: period.max(2),
            overbought,
            oversold,
        }
    }

    /// Latest RSI value, or `None` if there are fewer than `period + 1` closes.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        rsi(closes, self.period).last().copied()
    }

    pub fn zone(&self, value: f64) -> RsiZone {
        if value <= self.oversold {
            RsiZone::Oversold
        } else if value >= self.overbought {
            RsiZone::Overbought
        } else {
            RsiZone::Neutral
        }
    }
}

impl Default for RsiIndicator {
    fn default() -> Self {
        Self::new(14, 70.0, 30.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_when_insufficient_data() {
        // 10 closes with period 14: empty series, not an error
        let prices: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        assert!(rsi(&prices, 14).is_empty());
        assert!(RsiIndicator::default().compute(&prices).is_none());
    }

    #[test]
    fn rsi_length_is_input_minus_period() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&prices, 14).len(), 1);
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64).sin()).collect();
        assert_eq!(rsi(&prices, 14).len(), 26);
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let values = rsi(&prices, 3);
        assert!(values.iter().all(|v| (v - 100.0).abs() < 1e-9), "{values:?}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let value = RsiIndicator::new(3, 70.0, 30.0).compute(&prices).unwrap();
        assert!(value.abs() < 1e-9, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_known_wilder_value() {
        // Wilder's first value: 14 changes, avg gain / avg loss by hand.
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28,
        ];
        let values = rsi(&prices, 14);
        assert_eq!(values.len(), 1);
        let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        let gain: f64 = changes.iter().filter(|c| **c > 0.0).sum::<f64>() / 14.0;
        let loss: f64 = changes.iter().filter(|c| **c < 0.0).map(|c| -c).sum::<f64>() / 14.0;
        let expected = 100.0 - 100.0 / (1.0 + gain / loss);
        assert!((values[0] - expected).abs() < 1e-7);
        assert!(values[0] > 70.0);
    }

    #[test]
    fn rsi_skips_non_positive_and_nan_closes() {
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        prices.insert(5, f64::NAN);
        prices.insert(9, -3.0);
        assert_eq!(rsi(&prices, 14).len(), 6);
    }

    #[test]
    fn zone_classification() {
        let ind = RsiIndicator::default();
        assert_eq!(ind.zone(25.0), RsiZone::Oversold);
        assert_eq!(ind.zone(50.0), RsiZone::Neutral);
        assert_eq!(ind.zone(75.0), RsiZone::Overbought);
    }
}
