use tracing::debug;

use super::{round8, valid_bars};

/// True range of a bar given the previous close.
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// Average True Range with Wilder smoothing.
///
/// The first value is the mean of the first `period` true ranges (bars
/// `1..=period`), so the output has `len - period` points.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let bars = valid_bars(highs, lows, closes);
    if period == 0 || bars.len() < period + 1 {
        debug!(have = bars.len(), period, "ATR: insufficient data");
        return Vec::new();
    }

    let trs: Vec<f64> = bars
        .windows(2)
        .map(|w| true_range(w[1].0, w[1].1, w[0].2))
        .collect();

    let p = period as f64;
    let mut value = trs[..period].iter().sum::<f64>() / p;
    let mut out = Vec::with_capacity(trs.len() - period + 1);
    out.push(round8(value.max(0.0)));
    for &tr in &trs[period..] {
        value = (value * (p - 1.0) + tr) / p;
        out.push(round8(value.max(0.0)));
    }
    out
}
