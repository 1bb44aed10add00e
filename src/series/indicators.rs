//! Chart overlays derived from a (usually filtered) series.

use crate::types::{PricePoint, BAND_LOWER, BAND_UPPER};

/// Short trailing moving average window, in data points.
pub const MA_SHORT_WINDOW: usize = 200;
/// Long trailing moving average window (50 weeks of daily points).
pub const MA_LONG_WINDOW: usize = 350;
/// Multiplier for the "power-law support" line.
pub const SUPPORT_FACTOR: f64 = 0.5;

/// Bitcoin block-reward halvings, epoch ms at 00:00 UTC.
pub const HALVING_DATES_MS: [i64; 4] = [
    1_354_060_800_000, // 2012-11-28
    1_468_022_400_000, // 2016-07-09
    1_589_155_200_000, // 2020-05-11
    1_713_571_200_000, // 2024-04-20
];

/// Trailing mean of `actual_price` over `window` points. Positions with
/// fewer than `window` points up to and including them are `None`.
pub fn moving_average(series: &[PricePoint], window: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(series.len());
    if window == 0 {
        out.resize(series.len(), None);
        return out;
    }
    let mut sum = 0.0;
    for (i, point) in series.iter().enumerate() {
        sum += point.actual_price;
        if i >= window {
            sum -= series[i - window].actual_price;
        }
        if i + 1 >= window {
            out.push(Some(sum / window as f64));
        } else {
            out.push(None);
        }
    }
    out
}

/// `model_price × factor` for every point.
pub fn model_band(series: &[PricePoint], factor: f64) -> Vec<f64> {
    series.iter().map(|p| p.model_price * factor).collect()
}

/// Halving dates inside `[first.timestamp, last.timestamp]`.
pub fn halvings_within(series: &[PricePoint]) -> Vec<i64> {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Vec::new();
    };
    HALVING_DATES_MS
        .iter()
        .copied()
        .filter(|&d| d >= first.timestamp && d <= last.timestamp)
        .collect()
}

/// Every overlay the advanced chart can draw, index-aligned with the series.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOverlays {
    pub upper_band: Vec<f64>,
    pub lower_band: Vec<f64>,
    pub support: Vec<f64>,
    pub ma_short: Vec<Option<f64>>,
    pub ma_long: Vec<Option<f64>>,
    pub halvings: Vec<i64>,
}

impl ChartOverlays {
    pub fn compute(series: &[PricePoint]) -> Self {
        Self {
            upper_band: model_band(series, BAND_UPPER),
            lower_band: model_band(series, BAND_LOWER),
            support: model_band(series, SUPPORT_FACTOR),
            ma_short: moving_average(series, MA_SHORT_WINDOW),
            ma_long: moving_average(series, MA_LONG_WINDOW),
            halvings: halvings_within(series),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(values: &[f64]) -> Vec<PricePoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| PricePoint::new(i as i64, v, v * 2.0))
            .collect()
    }

    #[test]
    fn moving_average_marks_warmup_unavailable() {
        let s = prices(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let ma = moving_average(&s, 3);
        assert_eq!(ma, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn window_longer_than_series_is_all_unavailable() {
        let s = prices(&[1.0, 2.0]);
        assert_eq!(moving_average(&s, MA_SHORT_WINDOW), vec![None, None]);
        assert_eq!(moving_average(&s, 0), vec![None, None]);
    }

    #[test]
    fn long_window_first_value_is_plain_mean() {
        let values: Vec<f64> = (1..=MA_LONG_WINDOW).map(|v| v as f64).collect();
        let ma = moving_average(&prices(&values), MA_LONG_WINDOW);
        assert!(ma[..MA_LONG_WINDOW - 1].iter().all(Option::is_none));
        let last = ma[MA_LONG_WINDOW - 1].unwrap();
        assert!((last - 175.5).abs() < 1e-9, "last={last}");
    }

    #[test]
    fn bands_scale_model_price() {
        let overlays = ChartOverlays::compute(&prices(&[10.0]));
        assert_eq!(overlays.upper_band, vec![20.0 * BAND_UPPER]);
        assert_eq!(overlays.lower_band, vec![20.0 * BAND_LOWER]);
        assert_eq!(overlays.support, vec![10.0]);
    }

    #[test]
    fn only_halvings_inside_the_span() {
        let s = vec![
            PricePoint::new(1_500_000_000_000, 1.0, 1.0),
            PricePoint::new(1_700_000_000_000, 1.0, 1.0),
        ];
        assert_eq!(halvings_within(&s), vec![1_589_155_200_000]);
        assert!(halvings_within(&[]).is_empty());
    }
}
