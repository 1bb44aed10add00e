use std::sync::Arc;

use tokio::sync::mpsc;

use powerlaw_dashboard::dashboard::{
    forecast_panel, share_text, share_url, ChartFrame, DashboardControls, Summary, TimeMachineReading,
};
use powerlaw_dashboard::model::ConstantsSource;
use powerlaw_dashboard::types::{Projection, SeriesSnapshot};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ForecastState {
    Pending,
    Ready(Projection),
    Unavailable(String),
}

/// Year and snapshot load time a forecast was computed for.
type ForecastKey = (i32, i64);

/// Everything the render pass needs. Derived panels are recomputed whenever
/// the snapshot or a control changes.
pub struct AppState {
    pub controls: DashboardControls,
    pub snapshot: Option<Arc<SeriesSnapshot>>,
    pub summary: Option<Summary>,
    pub chart: Option<ChartFrame>,
    pub reading: Option<TimeMachineReading>,
    pub forecast: ForecastState,
    /// Key of the forecast currently shown or being computed.
    forecast_key: Option<ForecastKey>,
    forecast_tx: mpsc::UnboundedSender<(ForecastKey, ForecastState)>,
    forecast_rx: mpsc::UnboundedReceiver<(ForecastKey, ForecastState)>,
    pub share: Option<(String, String)>,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        let (forecast_tx, forecast_rx) = mpsc::unbounded_channel();
        Self {
            controls: DashboardControls::default(),
            snapshot: None,
            summary: None,
            chart: None,
            reading: None,
            forecast: ForecastState::Pending,
            forecast_key: None,
            forecast_tx,
            forecast_rx,
            share: None,
            base_url,
        }
    }

    pub fn set_snapshot(&mut self, snapshot: Arc<SeriesSnapshot>, now_ms: i64) {
        self.summary = Some(Summary::of(&snapshot));
        self.snapshot = Some(snapshot);
        self.share = None;
        self.rebuild(now_ms);
    }

    /// Recompute chart and time-machine panels after a control change.
    pub fn rebuild(&mut self, now_ms: i64) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        self.chart = Some(ChartFrame::build(snapshot, &self.controls, now_ms));
        self.reading = TimeMachineReading::at(snapshot, self.controls.scrubber);
    }

    /// Start computing the forecast if the year or the snapshot changed.
    /// Resolution runs on its own task; the panel shows `Pending` until
    /// [`AppState::poll_forecast`] picks up the result.
    pub fn update_forecast(&mut self, source: &ConstantsSource) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let key = (self.controls.forecast_year, snapshot.loaded_at_ms);
        if self.forecast_key == Some(key) {
            return;
        }
        self.forecast_key = Some(key);
        self.forecast = ForecastState::Pending;

        let source = source.clone();
        let snapshot = Arc::clone(snapshot);
        let tx = self.forecast_tx.clone();
        tokio::spawn(async move {
            let state = match forecast_panel(key.0, &source, &snapshot.points).await {
                Ok(p) => ForecastState::Ready(p),
                Err(e) => ForecastState::Unavailable(e.to_string()),
            };
            let _ = tx.send((key, state));
        });
    }

    /// Apply finished forecasts without waiting.
    pub fn poll_forecast(&mut self) {
        while let Ok((key, state)) = self.forecast_rx.try_recv() {
            self.apply_forecast(key, state);
        }
    }

    /// Results for a year or snapshot no longer shown are dropped.
    fn apply_forecast(&mut self, key: ForecastKey, state: ForecastState) {
        if self.forecast_key == Some(key) {
            self.forecast = state;
        }
    }

    pub fn prepare_share(&mut self) {
        let Some(summary) = &self.summary else {
            return;
        };
        let text = share_text(summary.current_price, summary.deviation);
        let url = share_url(&text).map(|u| u.to_string()).unwrap_or_default();
        self.share = Some((text, url));
    }
}

// ---------------------------------------------------------------------------
// Chart helpers
// ---------------------------------------------------------------------------

/// Min/max over every plotted y value, padded by 5%. Falls back to `[0, 1]`
/// when nothing is plottable.
pub fn y_bounds<'a, I>(series: I) -> [f64; 2]
where
    I: IntoIterator<Item = &'a [(f64, f64)]>,
{
    let (lo, hi) = series
        .into_iter()
        .flat_map(|s| s.iter().map(|(_, y)| *y))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));
    if !lo.is_finite() || !hi.is_finite() {
        return [0.0, 1.0];
    }
    let pad = ((hi - lo) * 0.05).max(f64::EPSILON);
    [lo - pad, hi + pad]
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use powerlaw_dashboard::fetcher::ApiClient;
    use powerlaw_dashboard::model::{forecast, ModelConstants};
    use powerlaw_dashboard::telemetry::FetchLatency;
    use powerlaw_dashboard::types::{PricePoint, Provenance};

    fn snapshot() -> Arc<SeriesSnapshot> {
        Arc::new(SeriesSnapshot {
            points: vec![PricePoint::new(1, 80.0, 100.0), PricePoint::new(2, 140.0, 100.0)],
            provenance: Provenance::Live,
            loaded_at_ms: 7,
        })
    }

    #[test]
    fn y_bounds_pads_and_defaults() {
        assert_eq!(y_bounds(Vec::<&[(f64, f64)]>::new()), [0.0, 1.0]);
        let a = [(0.0, 10.0), (1.0, 20.0)];
        let [lo, hi] = y_bounds([&a[..]]);
        assert!((lo - 9.5).abs() < 1e-9);
        assert!((hi - 20.5).abs() < 1e-9);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("±30% band", 4), "±30…");
    }

    #[test]
    fn share_uses_latest_summary() {
        let mut app = AppState::new("http://localhost".into());
        app.prepare_share();
        assert!(app.share.is_none());
        app.set_snapshot(snapshot(), 2);
        app.prepare_share();
        let (text, url) = app.share.clone().unwrap();
        assert!(text.contains("40.0% above"));
        assert!(url.starts_with("https://twitter.com/intent/tweet?text="));
    }

    async fn next_forecast(app: &mut AppState) {
        let (key, state) = app.forecast_rx.recv().await.unwrap();
        app.apply_forecast(key, state);
    }

    #[tokio::test]
    async fn forecast_runs_off_the_render_loop() {
        let source = ConstantsSource::Local(ModelConstants::default());
        let mut app = AppState::new("http://localhost".into());
        app.update_forecast(&source);
        assert_eq!(app.forecast, ForecastState::Pending);

        app.set_snapshot(snapshot(), 2);
        app.update_forecast(&source);
        assert_eq!(app.forecast, ForecastState::Pending);
        next_forecast(&mut app).await;
        assert!(matches!(app.forecast, ForecastState::Ready(_)));

        // Same year and snapshot: nothing new is started.
        app.update_forecast(&source);
        app.poll_forecast();
        assert!(matches!(app.forecast, ForecastState::Ready(_)));
    }

    #[tokio::test]
    async fn stale_forecast_results_are_dropped() {
        let source = ConstantsSource::Local(ModelConstants::default());
        let mut app = AppState::new("http://localhost".into());
        app.set_snapshot(snapshot(), 2);

        app.update_forecast(&source);
        let (first_key, first) = app.forecast_rx.recv().await.unwrap();
        app.controls.step_year(1);
        app.update_forecast(&source);

        app.apply_forecast(first_key, first);
        assert_eq!(app.forecast, ForecastState::Pending);

        next_forecast(&mut app).await;
        let ForecastState::Ready(p) = app.forecast.clone() else {
            panic!("expected a forecast");
        };
        assert_eq!(p.base_projection, forecast(2026, &ModelConstants::default()).base_projection);
    }

    #[tokio::test]
    async fn unreachable_constants_leave_the_panel_unavailable() {
        let latency = Arc::new(FetchLatency::new());
        let client =
            ApiClient::new("http://127.0.0.1:9/api", Duration::from_millis(200), latency).unwrap();
        let source = ConstantsSource::Remote(Arc::new(client));
        let mut app = AppState::new("http://localhost".into());
        app.set_snapshot(snapshot(), 2);

        app.update_forecast(&source);
        assert_eq!(app.forecast, ForecastState::Pending);
        next_forecast(&mut app).await;
        assert!(matches!(app.forecast, ForecastState::Unavailable(_)));
    }
}
