pub mod constants;
pub mod deviation;
pub mod power_law;

pub use constants::{ConstantsSource, ModelConstants, ModelVersion};
pub use deviation::{deviation, deviation_at, deviation_stats, Valuation};
pub use power_law::{days_since_start, forecast, forecast_with, model_price, year_start_ms};
