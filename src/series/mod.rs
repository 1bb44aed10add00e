pub mod indicators;
pub mod synthetic;
pub mod timeframe;

pub use indicators::{halvings_within, model_band, moving_average, ChartOverlays};
pub use synthetic::{synthesize_series, FixedJitter, Jitter, UniformJitter};
pub use timeframe::{filter_by_timeframe, filter_by_token, point_at_position};
