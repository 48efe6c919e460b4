//! Indicator library.
//!
//! Every function takes a plain slice, drops non-finite (and, for prices,
//! non-positive) values before computing, and returns a series aligned to a
//! suffix of the input. Too little data yields an empty `Vec`, never an error.
//! Outputs are rounded to 8 decimals so runs are reproducible bit for bit.

pub mod adx;
pub mod atr;
pub mod moving_average;
pub mod rsi;

pub use adx::adx;
pub use atr::atr;
pub use moving_average::{ema, sma};
pub use rsi::{rsi, RsiIndicator, RsiZone};

const PRECISION: f64 = 1e8;

/// Round to 8 decimal places.
pub fn round8(value: f64) -> f64 {
    (value * PRECISION).round() / PRECISION
}

pub(crate) fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

pub(crate) fn positive_values(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect()
}

/// Keep only bars where high, low and close are all usable prices.
pub(crate) fn valid_bars(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<(f64, f64, f64)> {
    highs
        .iter()
        .zip(lows)
        .zip(closes)
        .map(|((&h, &l), &c)| (h, l, c))
        .filter(|&(h, l, c)| {
            [h, l, c].iter().all(|v| v.is_finite() && *v > 0.0) && h >= l
        })
        .collect()
}

/// Value of a suffix-aligned `series` at candle `index`, for an input of
/// `input_len` candles. `None` inside the warmup or past the end.
pub fn align_at(series: &[f64], input_len: usize, index: usize) -> Option<f64> {
    let offset = input_len.checked_sub(series.len())?;
    if index < offset || index >= input_len {
        return None;
    }
    series.get(index - offset).copied()
}

/// Slice of a suffix-aligned `series` covering candles `..=index`.
pub fn aligned_prefix<T>(series: &[T], input_len: usize, index: usize) -> &[T] {
    let Some(offset) = input_len.checked_sub(series.len()) else {
        return &[];
    };
    if index < offset {
        return &[];
    }
    let end = (index - offset + 1).min(series.len());
    &series[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round8_truncates_noise() {
        assert_eq!(round8(0.1 + 0.2), 0.3);
        assert_eq!(round8(1.234_567_891_23), 1.234_567_89);
    }

    #[test]
    fn align_at_respects_warmup() {
        let series = [10.0, 11.0, 12.0];
        assert_eq!(align_at(&series, 5, 1), None);
        assert_eq!(align_at(&series, 5, 2), Some(10.0));
        assert_eq!(align_at(&series, 5, 4), Some(12.0));
        assert_eq!(align_at(&series, 5, 5), None);
    }

    #[test]
    fn aligned_prefix_ends_at_index() {
        let series = [10.0, 11.0, 12.0];
        assert!(aligned_prefix(&series, 5, 1).is_empty());
        assert_eq!(aligned_prefix(&series, 5, 3), &[10.0, 11.0]);
        assert_eq!(aligned_prefix(&series, 5, 4), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn invalid_bars_are_filtered() {
        let bars = valid_bars(
            &[10.0, f64::NAN, 12.0, 9.0],
            &[9.0, 9.0, 11.0, 10.0],
            &[9.5, 9.5, 11.5, 9.5],
        );
        assert_eq!(bars.len(), 2);
    }
}
