use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::fetcher::SeriesFetcher;
use crate::model::deviation;
use crate::telemetry::RefreshHealth;
use crate::types::SeriesSnapshot;

/// Anything that can produce a full series. Must not fail; failures are
/// expected to degrade to a synthetic snapshot inside the source.
pub trait SeriesSource: Send + Sync + 'static {
    fn fetch_series(&self) -> impl Future<Output = SeriesSnapshot> + Send;
}

impl SeriesSource for SeriesFetcher {
    fn fetch_series(&self) -> impl Future<Output = SeriesSnapshot> + Send {
        SeriesFetcher::fetch_series(self)
    }
}

// ---------------------------------------------------------------------------
// SeriesLoader
// ---------------------------------------------------------------------------

type InFlight = Shared<BoxFuture<'static, Arc<SeriesSnapshot>>>;

struct InFlightSlot {
    fut: InFlight,
    /// Callers currently awaiting `fut`.
    waiters: usize,
}

/// At most one fetch in flight. Callers arriving while a fetch runs join it
/// and receive the same snapshot. A fetch whose every caller gave up is
/// dropped, so a later call never receives its stale result.
pub struct SeriesLoader<S> {
    source: Arc<S>,
    in_flight: Mutex<Option<InFlightSlot>>,
}

impl<S: SeriesSource> SeriesLoader<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            in_flight: Mutex::new(None),
        }
    }

    pub async fn load(&self) -> Arc<SeriesSnapshot> {
        let mut waiter = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            let joined = slot.as_mut().map(|s| {
                s.waiters += 1;
                s.fut.clone()
            });
            let fut = match joined {
                Some(fut) => {
                    debug!("Joining in-flight series fetch");
                    fut
                }
                None => {
                    let source = Arc::clone(&self.source);
                    let fresh = async move { Arc::new(source.fetch_series().await) }
                        .boxed()
                        .shared();
                    *slot = Some(InFlightSlot {
                        fut: fresh.clone(),
                        waiters: 1,
                    });
                    fresh
                }
            };
            Waiter {
                slot: &self.in_flight,
                fut,
                finished: false,
            }
        };

        let snapshot = waiter.fut.clone().await;
        waiter.finished = true;
        snapshot
    }
}

/// Releases a caller's claim on the in-flight fetch, on completion or on drop.
struct Waiter<'a> {
    slot: &'a Mutex<Option<InFlightSlot>>,
    fut: InFlight,
    finished: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        let Some(current) = slot.as_mut().filter(|s| s.fut.ptr_eq(&self.fut)) else {
            return;
        };
        current.waiters = current.waiters.saturating_sub(1);
        if self.finished || current.waiters == 0 {
            if !self.finished {
                debug!("Abandoned series fetch dropped");
            }
            *slot = None;
        }
    }
}

// ---------------------------------------------------------------------------
// SeriesRefresher
// ---------------------------------------------------------------------------

/// Loads the series on start and then on a fixed period, publishing each
/// snapshot wholesale to subscribers.
pub struct SeriesRefresher<S> {
    loader: SeriesLoader<S>,
    period: Duration,
    health: Arc<RefreshHealth>,
    snapshot_tx: watch::Sender<Option<Arc<SeriesSnapshot>>>,
}

impl<S: SeriesSource> SeriesRefresher<S> {
    pub fn new(source: Arc<S>, period: Duration, health: Arc<RefreshHealth>) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            loader: SeriesLoader::new(source),
            period,
            health,
            snapshot_tx,
        }
    }

    /// Start the refresh task. The returned handle owns its lifetime.
    pub fn spawn(self) -> RefreshHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let snapshots = self.snapshot_tx.subscribe();
        let task = tokio::spawn(self.run(stop_rx, trigger_rx));
        RefreshHandle {
            stop_tx,
            trigger_tx,
            snapshots,
            task: Some(task),
        }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>, mut trigger_rx: mpsc::Receiver<()>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {}
                Some(()) = trigger_rx.recv() => debug!("Manual refresh requested"),
            }

            // Dropping the load future on stop discards a late result.
            let snapshot = tokio::select! {
                _ = stop_rx.changed() => break,
                snapshot = self.loader.load() => snapshot,
            };

            // Requests that arrived during the load are satisfied by it.
            while trigger_rx.try_recv().is_ok() {}

            self.publish(snapshot);
        }

        info!("Series refresher stopped");
    }

    fn publish(&self, snapshot: Arc<SeriesSnapshot>) {
        if snapshot.is_synthetic() {
            self.health.record_fallback(snapshot.loaded_at_ms);
            warn!(
                consecutive = self.health.consecutive_failures(),
                "Displaying synthetic series; live data unavailable"
            );
        } else {
            self.health.record_live(snapshot.loaded_at_ms);
        }
        info!(
            provenance = %snapshot.provenance,
            points = snapshot.points.len(),
            deviation = ?deviation(&snapshot.points),
            "Series refreshed",
        );
        self.snapshot_tx.send_replace(Some(snapshot));
    }
}

/// Lifecycle handle for a running refresher. Dropping it aborts the task.
pub struct RefreshHandle {
    stop_tx: watch::Sender<bool>,
    trigger_tx: mpsc::Sender<()>,
    snapshots: watch::Receiver<Option<Arc<SeriesSnapshot>>>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// A receiver that always holds the most recently published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<SeriesSnapshot>>> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Option<Arc<SeriesSnapshot>> {
        self.snapshots.borrow().clone()
    }

    /// Ask for an out-of-schedule refresh. Coalesced with any pending request.
    pub fn request_refresh(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Cancel the timer and any in-flight fetch, then wait for the task to exit.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PricePoint, Provenance};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps `delay` and returns a one-point snapshot numbered by call order.
    struct SlowSource {
        calls: AtomicUsize,
        delay: Duration,
        provenance: Provenance,
    }

    impl SlowSource {
        fn new(delay: Duration, provenance: Provenance) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), delay, provenance })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SeriesSource for SlowSource {
        fn fetch_series(&self) -> impl Future<Output = SeriesSnapshot> + Send {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as i64 + 1;
            let delay = self.delay;
            let provenance = self.provenance;
            async move {
                tokio::time::sleep(delay).await;
                SeriesSnapshot {
                    points: vec![PricePoint::new(n, 120.0, 100.0)],
                    provenance,
                    loaded_at_ms: n,
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_share_one_fetch() {
        let source = SlowSource::new(Duration::from_secs(2), Provenance::Live);
        let loader = SeriesLoader::new(Arc::clone(&source));

        let (a, b) = tokio::join!(loader.load(), loader.load());
        assert_eq!(source.calls(), 1);
        assert!(Arc::ptr_eq(&a, &b));

        let c = loader.load().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(c.loaded_at_ms, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_fetch_is_not_reused() {
        let source = SlowSource::new(Duration::from_secs(2), Provenance::Live);
        let loader = SeriesLoader::new(Arc::clone(&source));

        let timed_out = tokio::time::timeout(Duration::from_secs(1), loader.load()).await;
        assert!(timed_out.is_err());
        assert_eq!(source.calls(), 1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        let fresh = loader.load().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(fresh.loaded_at_ms, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_caller_keeps_shared_fetch_alive() {
        let source = SlowSource::new(Duration::from_secs(2), Provenance::Live);
        let loader = SeriesLoader::new(Arc::clone(&source));

        let (gave_up, kept) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(1), loader.load()),
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                loader.load().await
            },
        );
        assert!(gave_up.is_err());
        assert_eq!(kept.loaded_at_ms, 1);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loads_immediately_then_on_period() {
        let source = SlowSource::new(Duration::from_millis(10), Provenance::Live);
        let health = Arc::new(RefreshHealth::new());
        let handle = SeriesRefresher::new(Arc::clone(&source), Duration::from_secs(300), Arc::clone(&health)).spawn();
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(handle.latest().unwrap().loaded_at_ms, 1);
        assert_eq!(health.refresh_count(), 1);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(source.calls(), 1);

        rx.changed().await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(handle.latest().unwrap().loaded_at_ms, 2);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(3_000)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_discards_in_flight_result() {
        let source = SlowSource::new(Duration::from_secs(60), Provenance::Live);
        let health = Arc::new(RefreshHealth::new());
        let handle = SeriesRefresher::new(Arc::clone(&source), Duration::from_secs(300), Arc::clone(&health)).spawn();
        let rx = handle.subscribe();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.borrow().is_none());
        assert_eq!(health.refresh_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_requests_during_load_are_coalesced() {
        let source = SlowSource::new(Duration::from_secs(5), Provenance::Synthetic);
        let health = Arc::new(RefreshHealth::new());
        let handle = SeriesRefresher::new(Arc::clone(&source), Duration::from_secs(300), Arc::clone(&health)).spawn();
        let mut rx = handle.subscribe();

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.request_refresh();
        handle.request_refresh();
        rx.changed().await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 1);
        assert!(health.fallback_active());
        assert_eq!(health.consecutive_failures(), 1);

        handle.request_refresh();
        rx.changed().await.unwrap();
        assert_eq!(source.calls(), 2);
        handle.stop().await;
    }
}
