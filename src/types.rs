use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::MS_PER_DAY;

// ---------------------------------------------------------------------------
// Price series
// ---------------------------------------------------------------------------

/// One observation: actual market price next to the model price at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub actual_price: f64,
    pub model_price: f64,
}

impl PricePoint {
    pub fn new(timestamp: i64, actual_price: f64, model_price: f64) -> Self {
        Self {
            timestamp,
            actual_price,
            model_price,
        }
    }
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Returned by the remote data service.
    Live,
    /// Generated locally from the model plus random jitter. Not real prices.
    Synthetic,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provenance::Live => "live",
            Provenance::Synthetic => "synthetic",
        };
        write!(f, "{s}")
    }
}

/// A full series as loaded by one refresh. Replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    /// Ordered by strictly increasing timestamp.
    pub points: Vec<PricePoint>,
    pub provenance: Provenance,
    /// Epoch milliseconds when the load finished.
    pub loaded_at_ms: i64,
}

impl SeriesSnapshot {
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn is_synthetic(&self) -> bool {
        self.provenance == Provenance::Synthetic
    }
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

/// Multiplier for the lower edge of the forecast band.
pub const BAND_LOWER: f64 = 0.7;
/// Multiplier for the upper edge of the forecast band.
pub const BAND_UPPER: f64 = 1.3;

/// Mean and population standard deviation of per-point deviations (percent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationStats {
    pub average: f64,
    pub standard_deviation: f64,
}

/// Projected price range for a target date.
///
/// The band is a fixed ±30% around the base projection. It is not a
/// statistical confidence interval; `historical_deviation` is informational
/// and never feeds the band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub base_projection: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_deviation: Option<DeviationStats>,
}

impl Projection {
    pub fn from_base(base_projection: f64) -> Self {
        Self {
            base_projection,
            lower_bound: base_projection * BAND_LOWER,
            upper_bound: base_projection * BAND_UPPER,
            historical_deviation: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Display controls
// ---------------------------------------------------------------------------

/// Relative display window over a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    OneWeek,
    OneMonth,
    OneYear,
    FiveYears,
    /// No filtering. Also what unrecognized tokens map to.
    Max,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::OneWeek,
        Timeframe::OneMonth,
        Timeframe::OneYear,
        Timeframe::FiveYears,
        Timeframe::Max,
    ];

    /// Lenient parse: unknown tokens fall back to [`Timeframe::Max`].
    pub fn from_token(token: &str) -> Self {
        token.parse().unwrap_or(Timeframe::Max)
    }

    /// Width of the window in milliseconds, `None` for unbounded.
    pub fn span_ms(self) -> Option<i64> {
        let days = match self {
            Timeframe::OneWeek => 7,
            Timeframe::OneMonth => 30,
            Timeframe::OneYear => 365,
            Timeframe::FiveYears => 5 * 365,
            Timeframe::Max => return None,
        };
        Some(days * MS_PER_DAY)
    }

    pub fn token(self) -> &'static str {
        match self {
            Timeframe::OneWeek => "1W",
            Timeframe::OneMonth => "1M",
            Timeframe::OneYear => "1Y",
            Timeframe::FiveYears => "5Y",
            Timeframe::Max => "MAX",
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1W" => Ok(Timeframe::OneWeek),
            "1M" => Ok(Timeframe::OneMonth),
            "1Y" => Ok(Timeframe::OneYear),
            "5Y" => Ok(Timeframe::FiveYears),
            "MAX" | "All" => Ok(Timeframe::Max),
            other => Err(format!("unknown timeframe '{other}'")),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Price axis scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceScale {
    Linear,
    #[default]
    Logarithmic,
}

impl PriceScale {
    pub fn toggled(self) -> Self {
        match self {
            PriceScale::Linear => PriceScale::Logarithmic,
            PriceScale::Logarithmic => PriceScale::Linear,
        }
    }

    /// Map a price onto the axis. Non-positive prices have no log position.
    pub fn project(self, price: f64) -> Option<f64> {
        match self {
            PriceScale::Linear => Some(price),
            PriceScale::Logarithmic if price > 0.0 => Some(price.log10()),
            PriceScale::Logarithmic => None,
        }
    }
}

impl std::fmt::Display for PriceScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceScale::Linear => write!(f, "linear"),
            PriceScale::Logarithmic => write!(f, "log"),
        }
    }
}
