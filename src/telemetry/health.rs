//! Shared refresh health, updated by the refresher and read by the views.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct RefreshHealth {
    /// Completed refreshes, live or synthetic.
    refresh_count: AtomicU64,
    /// Refreshes in a row that had to fall back to synthetic data.
    consecutive_failures: AtomicU64,
    /// Epoch ms of the last published snapshot (0 = none yet).
    last_refresh_at_ms: AtomicI64,
    /// True while the published snapshot is synthetic.
    fallback_active: AtomicBool,
}

impl RefreshHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_live(&self, at_ms: i64) {
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_refresh_at_ms.store(at_ms, Ordering::Relaxed);
        self.fallback_active.store(false, Ordering::Relaxed);
    }

    pub fn record_fallback(&self, at_ms: i64) {
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.last_refresh_at_ms.store(at_ms, Ordering::Relaxed);
        self.fallback_active.store(true, Ordering::Relaxed);
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn last_refresh_at_ms(&self) -> Option<i64> {
        match self.last_refresh_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback_active.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_refresh_resets_failure_streak() {
        let h = RefreshHealth::new();
        assert_eq!(h.last_refresh_at_ms(), None);
        h.record_fallback(10);
        h.record_fallback(20);
        assert_eq!(h.consecutive_failures(), 2);
        assert!(h.fallback_active());
        h.record_live(30);
        assert_eq!(h.consecutive_failures(), 0);
        assert_eq!(h.refresh_count(), 3);
        assert_eq!(h.last_refresh_at_ms(), Some(30));
        assert!(!h.fallback_active());
    }
}
