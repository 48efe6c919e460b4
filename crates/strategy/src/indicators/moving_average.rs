use tracing::debug;

use super::{finite_values, round8};

/// Simple moving average. Returns `values.len() - period + 1` points.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let values = finite_values(values);
    if period == 0 || values.len() < period {
        debug!(have = values.len(), period, "SMA: insufficient data");
        return Vec::new();
    }

    let p = period as f64;
    let mut sum: f64 = values[..period].iter().sum();
    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(round8(sum / p));
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out.push(round8(sum / p));
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values, smoothing factor `2 / (period + 1)`. Same length as [`sma`].
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let values = finite_values(values);
    if period == 0 || values.len() < period {
        debug!(have = values.len(), period, "EMA: insufficient data");
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema_val: f64 = values[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(round8(ema_val));
    for &price in &values[period..] {
        ema_val = price * k + ema_val * (1.0 - k);
        out.push(round8(ema_val));
    }
    out
}
