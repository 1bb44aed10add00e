//! Power-law price model: `price = A × days^B × scale`, where `days` counts
//! from the genesis block.

use chrono::{DateTime, Utc};

use crate::config::MS_PER_DAY;
use crate::error::Result;
use crate::model::constants::{ConstantsSource, ModelConstants};
use crate::types::Projection;

/// Fractional days between `start_date_ms` and `date_ms`. Negative before genesis.
pub fn days_since_start(date_ms: i64, constants: &ModelConstants) -> f64 {
    (date_ms as f64 - constants.start_date_ms as f64) / MS_PER_DAY as f64
}

/// Model price at `date_ms`. Dates at or before the start date price at `0.0`.
pub fn model_price(date_ms: i64, constants: &ModelConstants) -> f64 {
    let days = days_since_start(date_ms, constants);
    if days <= 0.0 {
        return 0.0;
    }
    constants.a * days.powf(constants.b) * constants.scale
}

pub fn model_price_at(date: DateTime<Utc>, constants: &ModelConstants) -> f64 {
    model_price(date.timestamp_millis(), constants)
}

/// Epoch milliseconds of January 1st, 00:00 UTC, of `year` (proleptic Gregorian).
/// Saturates at the `i64` range for years that far out.
pub fn year_start_ms(year: i32) -> i64 {
    // Julian day number of January 1st, counted as month 10 of a March-based year.
    let y = year as i64 + 4799;
    let m = 10;
    let leap_days = y.div_euclid(4) - y.div_euclid(100) + y.div_euclid(400);
    let jdn = 1 + (153 * m + 2) / 5 + 365 * y + leap_days - 32045;
    let unix_days = jdn - 2_440_588;
    unix_days.saturating_mul(MS_PER_DAY)
}

/// Projected price range for January 1st of `year`.
pub fn forecast(year: i32, constants: &ModelConstants) -> Projection {
    Projection::from_base(model_price(year_start_ms(year), constants))
}

/// Like [`forecast`], resolving constants first. A resolution failure is
/// returned to the caller; no projection is fabricated.
pub async fn forecast_with(year: i32, source: &ConstantsSource) -> Result<Projection> {
    let constants = source.resolve().await?;
    Ok(forecast(year, &constants))
}
