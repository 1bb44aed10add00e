//! In-memory latency histogram for remote fetches.
//! Records round-trip time of every request to the data service.

use std::sync::Mutex;
use std::time::Duration;

/// Shared fetch latency stats. API client records, monitor and dashboard read.
/// Values stored in microseconds.
pub struct FetchLatency {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl FetchLatency {
    /// Tracks 1us to 10 minutes, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().clamp(1, 600_000_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us);
        }
    }

    /// Return (p50_ms, p95_ms, p99_ms). None if no samples.
    pub fn percentiles_ms(&self) -> Option<(f64, f64, f64)> {
        let h = self.inner.lock().ok()?;
        if h.len() == 0 {
            return None;
        }
        let ms = |q: f64| h.value_at_quantile(q) as f64 / 1_000.0;
        Some((ms(0.5), ms(0.95), ms(0.99)))
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FetchLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = FetchLatency::new();
        assert!(stats.is_empty());
        assert!(stats.percentiles_ms().is_none());
    }

    #[test]
    fn percentiles_are_ordered() {
        let stats = FetchLatency::new();
        for ms in 1..=100u64 {
            stats.record(Duration::from_millis(ms));
        }
        let (p50, p95, p99) = stats.percentiles_ms().unwrap();
        assert_eq!(stats.len(), 100);
        assert!(p50 <= p95 && p95 <= p99);
        assert!((p50 - 50.0).abs() < 1.0, "p50={p50}");
    }
}
