//! Locally synthesized stand-in series, used when the data service is unreachable.
//! Shape follows the model; prices are NOT real.

use chrono::{DateTime, Months, Utc};
use rand::Rng;

use crate::config::{FALLBACK_STEP_DAYS, FALLBACK_YEARS, MS_PER_DAY};
use crate::model::{model_price, ModelConstants};
use crate::types::{PricePoint, BAND_LOWER, BAND_UPPER};

/// Source of the multiplicative noise applied to each synthetic actual price.
pub trait Jitter {
    fn factor(&mut self) -> f64;
}

/// Uniform draw from `[0.7, 1.3]`.
pub struct UniformJitter<R: Rng> {
    rng: R,
}

impl<R: Rng> UniformJitter<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> Jitter for UniformJitter<R> {
    fn factor(&mut self) -> f64 {
        self.rng.gen_range(BAND_LOWER..=BAND_UPPER)
    }
}

/// Constant factor. `FixedJitter(1.0)` reproduces the bare model.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn factor(&mut self) -> f64 {
        self.0
    }
}

/// First timestamp of the fallback window: `FALLBACK_YEARS` calendar years before `now_ms`.
fn window_start_ms(now_ms: i64) -> i64 {
    DateTime::<Utc>::from_timestamp_millis(now_ms)
        .and_then(|now| now.checked_sub_months(Months::new(12 * FALLBACK_YEARS)))
        .map(|start| start.timestamp_millis())
        .unwrap_or_else(|| now_ms.saturating_sub(FALLBACK_YEARS as i64 * 365 * MS_PER_DAY))
}

/// One point every `FALLBACK_STEP_DAYS` days from five years before `now_ms`
/// through `now_ms`, with `actual = model × jitter`.
pub fn synthesize_series(now_ms: i64, constants: &ModelConstants, jitter: &mut impl Jitter) -> Vec<PricePoint> {
    let step = FALLBACK_STEP_DAYS * MS_PER_DAY;
    let mut points = Vec::new();
    let mut ts = window_start_ms(now_ms);
    while ts <= now_ms {
        let model = model_price(ts, constants);
        points.push(PricePoint::new(ts, model * jitter.factor(), model));
        ts += step;
    }
    points
}
