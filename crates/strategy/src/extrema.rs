use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::SeriesPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremumKind {
    Peak,
    Trough,
}

/// A local extreme. `index` refers to the series it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtremePoint {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Find local peaks or troughs with a symmetric window of `order` neighbours.
///
/// Index `i` (with `order <= i < len - order`) is a peak iff its value is
/// strictly greater than every value within `order` positions on both sides;
/// troughs use strictly less. Ties are never extrema, and `order == 0` finds
/// nothing.
pub fn find_extrema(series: &[SeriesPoint], kind: ExtremumKind, order: usize) -> Vec<ExtremePoint> {
    if order == 0 || series.len() < 2 * order + 1 {
        return Vec::new();
    }

    let beats = |a: f64, b: f64| match kind {
        ExtremumKind::Peak => a > b,
        ExtremumKind::Trough => a < b,
    };

    (order..series.len() - order)
        .filter(|&i| {
            let v = series[i].value;
            v.is_finite()
                && (1..=order).all(|j| beats(v, series[i - j].value) && beats(v, series[i + j].value))
        })
        .map(|i| ExtremePoint {
            index: i,
            timestamp: series[i].timestamp,
            value: series[i].value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn points(values: &[f64]) -> Vec<SeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| SeriesPoint {
                timestamp: Utc.timestamp_opt(i as i64 * 60, 0).unwrap(),
                value,
            })
            .collect()
    }

    #[test]
    fn finds_peaks_and_troughs() {
        let s = points(&[1.0, 3.0, 2.0, 0.5, 2.0, 4.0, 1.0]);
        let peaks = find_extrema(&s, ExtremumKind::Peak, 1);
        let troughs = find_extrema(&s, ExtremumKind::Trough, 1);
        assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1, 5]);
        assert_eq!(troughs.iter().map(|p| p.index).collect::<Vec<_>>(), vec![3]);
        assert_eq!(troughs[0].value, 0.5);
        assert_eq!(troughs[0].timestamp.timestamp(), 180);
    }

    #[test]
    fn ties_are_not_extrema() {
        let s = points(&[1.0, 3.0, 3.0, 1.0, 1.0]);
        assert!(find_extrema(&s, ExtremumKind::Peak, 1).is_empty());
    }

    #[test]
    fn order_widens_the_window() {
        let s = points(&[5.0, 4.0, 1.0, 2.0, 0.5, 3.0, 4.0]);
        let order1 = find_extrema(&s, ExtremumKind::Trough, 1);
        let order2 = find_extrema(&s, ExtremumKind::Trough, 2);
        assert_eq!(order1.len(), 2);
        assert_eq!(order2.iter().map(|p| p.index).collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn edges_and_zero_order_yield_nothing() {
        let s = points(&[0.0, 5.0, 0.0]);
        assert!(find_extrema(&s, ExtremumKind::Trough, 1).is_empty());
        assert!(find_extrema(&s, ExtremumKind::Peak, 0).is_empty());
        assert!(find_extrema(&s, ExtremumKind::Peak, 2).is_empty());
    }
}
