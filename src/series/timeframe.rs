use crate::types::{PricePoint, Timeframe};

/// Points with `timestamp >= now_ms - span`, order preserved. `Max` returns everything.
pub fn filter_by_timeframe(series: &[PricePoint], timeframe: Timeframe, now_ms: i64) -> Vec<PricePoint> {
    let Some(span) = timeframe.span_ms() else {
        return series.to_vec();
    };
    let bound = now_ms.saturating_sub(span);
    // Series is time-ordered, so the cut is a single partition point.
    let start = series.partition_point(|p| p.timestamp < bound);
    series[start..].to_vec()
}

/// Token-based variant. Unrecognized tokens return the full series.
pub fn filter_by_token(series: &[PricePoint], token: &str, now_ms: i64) -> Vec<PricePoint> {
    filter_by_timeframe(series, Timeframe::from_token(token), now_ms)
}

/// Scrubber lookup: `position` in 0..=100 maps to index `floor((len-1) × position / 100)`.
/// Out-of-range positions are clamped.
pub fn point_at_position(series: &[PricePoint], position: f64) -> Option<&PricePoint> {
    if series.is_empty() {
        return None;
    }
    let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 100.0) };
    let index = ((series.len() - 1) as f64 * (position / 100.0)).floor() as usize;
    series.get(index.min(series.len() - 1))
}
