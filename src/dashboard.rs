//! Dashboard view model: the display controls and every number the views
//! render, derived from the current snapshot. No terminal code lives here.

use chrono::{DateTime, Utc};
use reqwest::Url;

use crate::config::FORECAST_YEARS;
use crate::error::Result;
use crate::model::{
    deviation, deviation_at, deviation_stats, forecast_with, ConstantsSource, Valuation,
};
use crate::series::{filter_by_timeframe, point_at_position, ChartOverlays};
use crate::types::{PricePoint, PriceScale, Projection, Provenance, SeriesSnapshot, Timeframe};

const SHARE_INTENT_URL: &str = "https://twitter.com/intent/tweet";

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardControls {
    pub timeframe: Timeframe,
    pub scale: PriceScale,
    pub forecast_year: i32,
    /// Scrubber position, 0–100.
    pub scrubber: f64,
    /// Draw bands, support, moving averages and halvings.
    pub advanced: bool,
}

impl Default for DashboardControls {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::OneYear,
            scale: PriceScale::Logarithmic,
            forecast_year: 2025,
            scrubber: 50.0,
            advanced: false,
        }
    }
}

impl DashboardControls {
    pub fn next_timeframe(&mut self) {
        let i = Timeframe::ALL.iter().position(|t| *t == self.timeframe).unwrap_or(0);
        self.timeframe = Timeframe::ALL[(i + 1) % Timeframe::ALL.len()];
    }

    pub fn toggle_scale(&mut self) {
        self.scale = self.scale.toggled();
    }

    pub fn toggle_advanced(&mut self) {
        self.advanced = !self.advanced;
    }

    /// Step the forecast year by `delta`, staying inside the offered range.
    pub fn step_year(&mut self, delta: i32) {
        self.forecast_year = (self.forecast_year + delta).clamp(*FORECAST_YEARS.start(), *FORECAST_YEARS.end());
    }

    pub fn move_scrubber(&mut self, delta: f64) {
        self.scrubber = (self.scrubber + delta).clamp(0.0, 100.0);
    }
}

// ---------------------------------------------------------------------------
// Derived panels
// ---------------------------------------------------------------------------

/// Header and alert banner numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub current_price: Option<f64>,
    pub deviation: Option<f64>,
    pub valuation: Option<Valuation>,
    pub provenance: Provenance,
}

impl Summary {
    pub fn of(snapshot: &SeriesSnapshot) -> Self {
        let deviation = deviation(&snapshot.points);
        Self {
            current_price: snapshot.latest().map(|p| p.actual_price),
            deviation,
            valuation: deviation.map(Valuation::from_deviation),
            provenance: snapshot.provenance,
        }
    }

    /// Non-blocking notice shown while the data is synthetic.
    pub fn notice(&self) -> Option<&'static str> {
        match self.provenance {
            Provenance::Synthetic => {
                Some("Live data unavailable: showing simulated prices generated from the model")
            }
            Provenance::Live => None,
        }
    }
}

/// The chart's visible series plus overlays when advanced mode is on.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFrame {
    pub points: Vec<PricePoint>,
    pub overlays: Option<ChartOverlays>,
    pub scale: PriceScale,
}

impl ChartFrame {
    pub fn build(snapshot: &SeriesSnapshot, controls: &DashboardControls, now_ms: i64) -> Self {
        let points = filter_by_timeframe(&snapshot.points, controls.timeframe, now_ms);
        let overlays = controls.advanced.then(|| ChartOverlays::compute(&points));
        Self {
            points,
            overlays,
            scale: controls.scale,
        }
    }

    /// `(x, y)` pairs on the chosen axis scale. Points without a position
    /// on a log axis are skipped.
    pub fn plot<F: Fn(&PricePoint) -> f64>(&self, value: F) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .filter_map(|p| self.scale.project(value(p)).map(|y| (p.timestamp as f64, y)))
            .collect()
    }

    /// Same as [`ChartFrame::plot`] for an index-aligned overlay.
    pub fn plot_overlay(&self, values: &[Option<f64>]) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .zip(values)
            .filter_map(|(p, v)| v.and_then(|v| self.scale.project(v)).map(|y| (p.timestamp as f64, y)))
            .collect()
    }
}

/// Point-in-time reading under the scrubber.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeMachineReading {
    pub point: PricePoint,
    pub deviation: Option<f64>,
}

impl TimeMachineReading {
    pub fn at(snapshot: &SeriesSnapshot, position: f64) -> Option<Self> {
        point_at_position(&snapshot.points, position).map(|point| Self {
            point: *point,
            deviation: deviation_at(point),
        })
    }

    pub fn describe(&self) -> String {
        match self.deviation {
            Some(d) => format!(
                "Bitcoin was {:.1}% {} the model prediction",
                d.abs(),
                if d > 0.0 { "above" } else { "below" }
            ),
            None => "No model prediction for this date".to_string(),
        }
    }
}

/// Resolve constants and project `year`. When the projection carries no
/// deviation statistics, they are filled in from `series`.
pub async fn forecast_panel(year: i32, source: &ConstantsSource, series: &[PricePoint]) -> Result<Projection> {
    let mut projection = forecast_with(year, source).await?;
    if projection.historical_deviation.is_none() {
        projection.historical_deviation = deviation_stats(series);
    }
    Ok(projection)
}

// ---------------------------------------------------------------------------
// Share
// ---------------------------------------------------------------------------

pub fn share_text(current_price: Option<f64>, deviation: Option<f64>) -> String {
    let price = current_price.map(format_usd).unwrap_or_else(|| "unknown".to_string());
    match deviation.filter(|d| *d != 0.0) {
        Some(d) => format!(
            "Bitcoin is currently trading at {price} which is {:.1}% {} the Power Law model prediction. #Bitcoin #PowerLaw",
            d.abs(),
            if d > 0.0 { "above" } else { "below" }
        ),
        None => format!("Bitcoin is currently trading at {price}. #Bitcoin #PowerLaw"),
    }
}

/// Tweet-intent link with `text` percent-encoded into the query.
pub fn share_url(text: &str) -> Option<Url> {
    Url::parse_with_params(SHARE_INTENT_URL, &[("text", text)]).ok()
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// `$1,234,568`: whole dollars with thousands separators.
pub fn format_usd(price: f64) -> String {
    if !price.is_finite() {
        return "n/a".to_string();
    }
    let rounded = price.abs().round() as u128;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if price < 0.0 && rounded > 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

/// `Jan 1, 2025`.
pub fn format_date(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|d| d.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| "invalid date".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MS_PER_DAY;
    use crate::model::ModelConstants;

    const NOW: i64 = 1_735_689_600_000;

    fn snapshot(points: Vec<PricePoint>, provenance: Provenance) -> SeriesSnapshot {
        SeriesSnapshot { points, provenance, loaded_at_ms: NOW }
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(0.0), "$0");
        assert_eq!(format_usd(999.4), "$999");
        assert_eq!(format_usd(1_000.0), "$1,000");
        assert_eq!(format_usd(74_129.745), "$74,130");
        assert_eq!(format_usd(1_234_567.0), "$1,234,567");
        assert_eq!(format_usd(-2_500.0), "-$2,500");
        assert_eq!(format_usd(f64::NAN), "n/a");
    }

    #[test]
    fn date_formatting() {
        assert_eq!(format_date(NOW), "Jan 1, 2025");
        assert_eq!(format_date(1_713_571_200_000), "Apr 20, 2024");
    }

    #[test]
    fn summary_classifies_latest_point() {
        let s = snapshot(
            vec![PricePoint::new(1, 10.0, 10.0), PricePoint::new(2, 140.0, 100.0)],
            Provenance::Live,
        );
        let summary = Summary::of(&s);
        assert_eq!(summary.current_price, Some(140.0));
        assert_eq!(summary.valuation, Some(Valuation::Overvalued));
        assert!(summary.notice().is_none());
    }

    #[test]
    fn empty_synthetic_summary_has_notice_and_no_deviation() {
        let summary = Summary::of(&snapshot(Vec::new(), Provenance::Synthetic));
        assert_eq!(summary.deviation, None);
        assert_eq!(summary.valuation, None);
        assert!(summary.notice().is_some());
    }

    #[test]
    fn chart_frame_filters_and_adds_overlays_in_advanced_mode() {
        let points: Vec<PricePoint> = (0..10)
            .map(|d| PricePoint::new(NOW - (9 - d) * MS_PER_DAY, 100.0, 100.0))
            .collect();
        let s = snapshot(points, Provenance::Live);
        let mut controls = DashboardControls { timeframe: Timeframe::OneWeek, ..Default::default() };

        let frame = ChartFrame::build(&s, &controls, NOW);
        assert_eq!(frame.points.len(), 8);
        assert!(frame.overlays.is_none());

        controls.toggle_advanced();
        let frame = ChartFrame::build(&s, &controls, NOW);
        let overlays = frame.overlays.as_ref().unwrap();
        assert_eq!(overlays.upper_band.len(), 8);
        assert!(frame.plot_overlay(&overlays.ma_short).is_empty());
    }

    #[test]
    fn log_plot_skips_zero_prices() {
        let s = snapshot(
            vec![PricePoint::new(1, 0.0, 0.0), PricePoint::new(2, 100.0, 10.0)],
            Provenance::Live,
        );
        let controls = DashboardControls { timeframe: Timeframe::Max, ..Default::default() };
        let frame = ChartFrame::build(&s, &controls, NOW);
        assert_eq!(frame.plot(|p| p.actual_price), vec![(2.0, 2.0)]);
        assert_eq!(frame.plot(|p| p.model_price), vec![(2.0, 1.0)]);
    }

    #[test]
    fn controls_stay_in_range() {
        let mut c = DashboardControls::default();
        c.step_year(100);
        assert_eq!(c.forecast_year, 2035);
        c.step_year(-100);
        assert_eq!(c.forecast_year, 2024);
        c.move_scrubber(80.0);
        assert_eq!(c.scrubber, 100.0);
        for _ in 0..Timeframe::ALL.len() {
            c.next_timeframe();
        }
        assert_eq!(c.timeframe, Timeframe::OneYear);
        c.toggle_scale();
        assert_eq!(c.scale, PriceScale::Linear);
    }

    #[test]
    fn time_machine_reads_scrubbed_point() {
        let s = snapshot(
            vec![
                PricePoint::new(1, 50.0, 100.0),
                PricePoint::new(2, 150.0, 100.0),
                PricePoint::new(3, 100.0, 100.0),
            ],
            Provenance::Live,
        );
        let reading = TimeMachineReading::at(&s, 50.0).unwrap();
        assert_eq!(reading.point.timestamp, 2);
        assert_eq!(reading.describe(), "Bitcoin was 50.0% above the model prediction");
        let reading = TimeMachineReading::at(&s, 0.0).unwrap();
        assert_eq!(reading.describe(), "Bitcoin was 50.0% below the model prediction");
    }

    #[test]
    fn share_text_variants() {
        assert_eq!(
            share_text(Some(97_000.0), Some(-12.34)),
            "Bitcoin is currently trading at $97,000 which is 12.3% below the Power Law model prediction. #Bitcoin #PowerLaw"
        );
        assert_eq!(share_text(None, None), "Bitcoin is currently trading at unknown. #Bitcoin #PowerLaw");
    }

    #[test]
    fn share_url_encodes_text() {
        let url = share_url("price $1,000 #Bitcoin").unwrap();
        assert!(url.as_str().starts_with("https://twitter.com/intent/tweet?text="));
        assert!(url.as_str().contains("%23Bitcoin"));
        assert!(!url.as_str().contains(' '));
    }

    #[tokio::test]
    async fn forecast_panel_fills_stats_from_series() {
        let source = ConstantsSource::Local(ModelConstants::default());
        let series = vec![PricePoint::new(1, 110.0, 100.0), PricePoint::new(2, 90.0, 100.0)];
        let p = forecast_panel(2030, &source, &series).await.unwrap();
        let stats = p.historical_deviation.unwrap();
        assert!((stats.standard_deviation - 10.0).abs() < 1e-9);
        assert_eq!(p.lower_bound, p.base_projection * 0.7);
    }
}
