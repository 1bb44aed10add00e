use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::model::constants::ModelConstants;
use crate::series::synthetic::{synthesize_series, UniformJitter};
use crate::telemetry::FetchLatency;
use crate::types::{DeviationStats, PricePoint, Projection, Provenance, SeriesSnapshot};

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitcoinDataPayload {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
    power_law_data: Vec<RawPricePoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPricePoint {
    timestamp: Option<f64>,
    actual_price: Option<f64>,
    model_price: Option<f64>,
}

/// `GET /api/deviation` body.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationPayload {
    pub deviation: Option<f64>,
    pub current_price: Option<f64>,
    pub model_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastPayload {
    base_projection: f64,
    lower_bound: Option<f64>,
    upper_bound: Option<f64>,
    historical_deviation: Option<DeviationStats>,
}

#[derive(Debug, Deserialize)]
struct ConstantsPayload {
    #[serde(rename = "A")]
    a: f64,
    #[serde(rename = "B")]
    b: f64,
    #[serde(rename = "startDate", alias = "START_DATE")]
    start_date: f64,
    #[serde(default, alias = "SCALE")]
    scale: Option<f64>,
    #[serde(default)]
    version: Option<String>,
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// Typed client for the remote data service. Every response is validated
/// before it reaches any arithmetic.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    latency: Arc<FetchLatency>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, latency: Arc<FetchLatency>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            latency,
        })
    }

    pub fn from_config(cfg: &Config, latency: Arc<FetchLatency>) -> Result<Self> {
        Self::new(cfg.api_base_url.clone(), cfg.http_timeout, latency)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url}");
        let started = Instant::now();
        let result = self.http.get(&url).header("Accept", "application/json").send().await;
        self.latency.record(started.elapsed());

        let resp = result?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Status {
                endpoint: path.to_string(),
                status,
            });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `GET /bitcoin-data` → validated, time-ordered series.
    pub async fn fetch_bitcoin_data(&self) -> Result<Vec<PricePoint>> {
        let payload: BitcoinDataPayload = self.get_json("/bitcoin-data").await?;
        if payload.prices.iter().any(|(ts, p)| !ts.is_finite() || !p.is_finite()) {
            return Err(AppError::InvalidPayload(
                "prices contains a non-numeric entry".to_string(),
            ));
        }
        validate_series(payload.power_law_data)
    }

    /// `GET /deviation`.
    pub async fn fetch_deviation(&self) -> Result<DeviationPayload> {
        let payload: DeviationPayload = self.get_json("/deviation").await?;
        if payload.deviation.is_some_and(|d| !d.is_finite()) {
            return Err(AppError::InvalidPayload("deviation is not finite".to_string()));
        }
        Ok(payload)
    }

    /// `GET /forecast/{year}`. The band is re-derived from the base
    /// projection; remote bounds that disagree are logged and ignored.
    pub async fn fetch_forecast(&self, year: i32) -> Result<Projection> {
        let payload: ForecastPayload = self.get_json(&format!("/forecast/{year}")).await?;
        if !payload.base_projection.is_finite() || payload.base_projection < 0.0 {
            return Err(AppError::InvalidPayload(format!(
                "baseProjection must be a non-negative number, got {}",
                payload.base_projection
            )));
        }
        let mut projection = Projection::from_base(payload.base_projection);
        if payload.lower_bound.is_some_and(|v| v != projection.lower_bound)
            || payload.upper_bound.is_some_and(|v| v != projection.upper_bound)
        {
            debug!(
                year,
                remote_lower = ?payload.lower_bound,
                remote_upper = ?payload.upper_bound,
                "Remote forecast band differs from ±30%; using derived band"
            );
        }
        projection.historical_deviation = payload.historical_deviation;
        Ok(projection)
    }

    /// `GET /constants`.
    pub async fn fetch_constants(&self) -> Result<ModelConstants> {
        let payload: ConstantsPayload = self.get_json("/constants").await?;
        if !payload.start_date.is_finite() {
            return Err(AppError::InvalidPayload("startDate is not finite".to_string()));
        }
        ModelConstants::new(
            payload.version.unwrap_or_else(|| "remote".to_string()),
            payload.a,
            payload.b,
            payload.start_date as i64,
            payload.scale.unwrap_or(1.0),
        )
        .map_err(|e| AppError::InvalidPayload(e.to_string()))
    }
}

/// Largest timestamp magnitude that converts to `i64` exactly.
const MAX_TIMESTAMP_MS: f64 = 9_007_199_254_740_991.0;

/// Reject anything the calculators could not safely consume.
fn validate_series(raw: Vec<RawPricePoint>) -> Result<Vec<PricePoint>> {
    if raw.is_empty() {
        return Err(AppError::InvalidPayload("powerLawData is empty".to_string()));
    }
    let mut points = Vec::with_capacity(raw.len());
    for (i, r) in raw.into_iter().enumerate() {
        let (Some(ts), Some(actual), Some(model)) = (r.timestamp, r.actual_price, r.model_price) else {
            return Err(AppError::InvalidPayload(format!("point {i} is missing a field")));
        };
        if !ts.is_finite() || ts.fract() != 0.0 || ts.abs() > MAX_TIMESTAMP_MS {
            return Err(AppError::InvalidPayload(format!(
                "point {i} has an invalid timestamp {ts}; expected whole epoch milliseconds"
            )));
        }
        if !actual.is_finite() || actual < 0.0 || !model.is_finite() || model < 0.0 {
            return Err(AppError::InvalidPayload(format!(
                "point {i} has an invalid price (actual={actual}, model={model})"
            )));
        }
        let point = PricePoint::new(ts as i64, actual, model);
        if let Some(prev) = points.last().map(|p: &PricePoint| p.timestamp) {
            if point.timestamp <= prev {
                return Err(AppError::InvalidPayload(format!(
                    "point {i} timestamp {} is not after {prev}",
                    point.timestamp
                )));
            }
        }
        points.push(point);
    }
    Ok(points)
}

// ---------------------------------------------------------------------------
// SeriesFetcher: live series with synthetic fallback
// ---------------------------------------------------------------------------

/// Loads the live series and falls back to a synthesized one on any failure.
/// `fetch_series` never returns an error.
pub struct SeriesFetcher {
    client: Arc<ApiClient>,
    constants: ModelConstants,
    rng: Mutex<StdRng>,
}

impl SeriesFetcher {
    pub fn new(client: Arc<ApiClient>, constants: ModelConstants, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            client,
            constants,
            rng: Mutex::new(rng),
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub async fn fetch_series(&self) -> SeriesSnapshot {
        match self.client.fetch_bitcoin_data().await {
            Ok(points) => {
                let loaded_at_ms = now_ms();
                info!(
                    provenance = %Provenance::Live,
                    points = points.len(),
                    "Loaded {} live points from {}",
                    points.len(),
                    self.client.base_url(),
                );
                SeriesSnapshot {
                    points,
                    provenance: Provenance::Live,
                    loaded_at_ms,
                }
            }
            Err(e) => {
                warn!("Series fetch failed, using synthetic fallback: {e}");
                self.synthesize(now_ms())
            }
        }
    }

    fn synthesize(&self, now: i64) -> SeriesSnapshot {
        let points = match self.rng.lock() {
            Ok(mut rng) => synthesize_series(now, &self.constants, &mut UniformJitter::new(&mut *rng)),
            Err(poisoned) => {
                let mut rng = poisoned.into_inner();
                synthesize_series(now, &self.constants, &mut UniformJitter::new(&mut *rng))
            }
        };
        info!(
            provenance = %Provenance::Synthetic,
            points = points.len(),
            "Synthesized {} fallback points (model {})",
            points.len(),
            self.constants.version,
        );
        SeriesSnapshot {
            points,
            provenance: Provenance::Synthetic,
            loaded_at_ms: now,
        }
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
