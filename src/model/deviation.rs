use serde::{Deserialize, Serialize};

use crate::config::valuation_thresholds::{OVERVALUED_ABOVE, UNDERVALUED_BELOW};
use crate::types::{DeviationStats, PricePoint};

/// Signed percentage of `actual` above (positive) or below (negative) `model`.
/// `None` when the model price is zero or the result is not finite.
pub fn deviation_at(point: &PricePoint) -> Option<f64> {
    if point.model_price == 0.0 {
        return None;
    }
    let pct = (point.actual_price - point.model_price) / point.model_price * 100.0;
    pct.is_finite().then_some(pct)
}

/// Deviation of the latest point in `series`. `None` means "no data available".
pub fn deviation(series: &[PricePoint]) -> Option<f64> {
    series.last().and_then(deviation_at)
}

/// Mean and population standard deviation of every computable per-point deviation.
pub fn deviation_stats(series: &[PricePoint]) -> Option<DeviationStats> {
    let values: Vec<f64> = series.iter().filter_map(deviation_at).collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let average = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / n;
    Some(DeviationStats {
        average,
        standard_deviation: variance.sqrt(),
    })
}

/// Display classification of a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Valuation {
    /// deviation > +30%
    Overvalued,
    /// deviation < -30%
    Undervalued,
    /// -30% ≤ deviation ≤ +30%
    Neutral,
}

impl Valuation {
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation > OVERVALUED_ABOVE {
            Valuation::Overvalued
        } else if deviation < UNDERVALUED_BELOW {
            Valuation::Undervalued
        } else {
            Valuation::Neutral
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            Valuation::Overvalued => "CAUTION: BTC overvalued",
            Valuation::Undervalued => "HODL ALERT: BTC undervalued per model",
            Valuation::Neutral => "BTC trading near model value",
        }
    }

    pub fn description(self, deviation: f64) -> String {
        match self {
            Valuation::Overvalued => format!(
                "Bitcoin is currently trading {:.1}% above its predicted value. Historical patterns suggest a potential correction.",
                deviation.abs()
            ),
            Valuation::Undervalued => format!(
                "Bitcoin is currently trading {:.1}% below its predicted value. Historical patterns suggest potential for upward movement.",
                deviation.abs()
            ),
            Valuation::Neutral => {
                "Bitcoin is currently trading close to its predicted value according to the Power Law model."
                    .to_string()
            }
        }
    }
}

impl std::fmt::Display for Valuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Valuation::Overvalued => "overvalued",
            Valuation::Undervalued => "undervalued",
            Valuation::Neutral => "neutral",
        };
        write!(f, "{s}")
    }
}
