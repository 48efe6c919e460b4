//! ADX (Average Directional Index) with Wilder smoothing.
//!
//! 1. +DM / -DM and true range from consecutive bars
//! 2. Wilder-smoothed sums of +DM, -DM and TR over `period`
//! 3. +DI / -DI = smoothed DM / smoothed TR * 100
//! 4. DX = |+DI - -DI| / (+DI + -DI) * 100
//! 5. ADX = mean of the first `period` DX values, then Wilder-smoothed
//!
//! The first ADX lands on bar `2 * period - 1`.

use tracing::debug;

use super::atr::true_range;
use super::{round8, valid_bars};

pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let bars = valid_bars(highs, lows, closes);
    if period == 0 || bars.len() < 2 * period {
        debug!(have = bars.len(), period, "ADX: insufficient data");
        return Vec::new();
    }

    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut trs = Vec::with_capacity(bars.len() - 1);
    for w in bars.windows(2) {
        let (prev_h, prev_l, prev_c) = w[0];
        let (h, l, _) = w[1];
        let up = h - prev_h;
        let down = prev_l - l;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        trs.push(true_range(h, l, prev_c));
    }

    let p = period as f64;
    let mut sm_plus: f64 = plus_dm[..period].iter().sum();
    let mut sm_minus: f64 = minus_dm[..period].iter().sum();
    let mut sm_tr: f64 = trs[..period].iter().sum();

    let mut dx = Vec::with_capacity(trs.len() - period + 1);
    dx.push(directional_index(sm_plus, sm_minus, sm_tr));
    for i in period..trs.len() {
        sm_plus = sm_plus - sm_plus / p + plus_dm[i];
        sm_minus = sm_minus - sm_minus / p + minus_dm[i];
        sm_tr = sm_tr - sm_tr / p + trs[i];
        dx.push(directional_index(sm_plus, sm_minus, sm_tr));
    }

    let mut value = dx[..period].iter().sum::<f64>() / p;
    let mut out = Vec::with_capacity(dx.len() - period + 1);
    out.push(round8(value));
    for &d in &dx[period..] {
        value = (value * (p - 1.0) + d) / p;
        out.push(round8(value));
    }
    out
}

fn directional_index(sm_plus: f64, sm_minus: f64, sm_tr: f64) -> f64 {
    if sm_tr <= 0.0 {
        return 0.0;
    }
    let di_plus = 100.0 * sm_plus / sm_tr;
    let di_minus = 100.0 * sm_minus / sm_tr;
    let sum = di_plus + di_minus;
    if sum <= 0.0 {
        0.0
    } else {
        (100.0 * (di_plus - di_minus).abs() / sum).clamp(0.0, 100.0)
    }
}
