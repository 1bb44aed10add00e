use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, Result};
use crate::fetcher::ApiClient;

/// Bitcoin genesis block date, 2009-01-03T00:00:00Z.
pub const GENESIS_MS: i64 = 1_230_940_800_000;

/// Calibration bundle for the power-law model.
///
/// The two historical calibrations are not interchangeable: `v1` yields
/// prices directly while `v2` needs its `scale` multiplier. Always pass a
/// whole bundle around; never mix fields from different versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConstants {
    pub version: String,
    pub a: f64,
    pub b: f64,
    pub start_date_ms: i64,
    pub scale: f64,
}

impl ModelConstants {
    pub fn new(version: impl Into<String>, a: f64, b: f64, start_date_ms: i64, scale: f64) -> Result<Self> {
        if !a.is_finite() || a <= 0.0 {
            return Err(AppError::Config(format!("model constant A must be positive, got {a}")));
        }
        if !b.is_finite() {
            return Err(AppError::Config(format!("model constant B must be finite, got {b}")));
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(AppError::Config(format!("model scale must be positive, got {scale}")));
        }
        Ok(Self {
            version: version.into(),
            a,
            b,
            start_date_ms,
            scale,
        })
    }

    /// Human-readable formula line, rendered from the constants actually in use.
    pub fn formula(&self) -> String {
        if (self.scale - 1.0).abs() < f64::EPSILON {
            format!("price = {} × days^{}", self.a, self.b)
        } else {
            format!("price = {} × days^{} × {}", self.a, self.b, self.scale)
        }
    }
}

impl Default for ModelConstants {
    fn default() -> Self {
        ModelVersion::V2.preset()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVersion {
    /// Recalibrated fit that produces prices directly.
    V1,
    /// Fit that requires the 1.5 scale multiplier.
    V2,
}

impl ModelVersion {
    pub fn preset(self) -> ModelConstants {
        match self {
            ModelVersion::V1 => ModelConstants {
                version: self.label().to_string(),
                a: 0.0147,
                b: 1.78,
                start_date_ms: GENESIS_MS,
                scale: 1.0,
            },
            ModelVersion::V2 => ModelConstants {
                version: self.label().to_string(),
                a: 0.0058,
                b: 1.84,
                start_date_ms: GENESIS_MS,
                scale: 1.5,
            },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelVersion::V1 => "v1",
            ModelVersion::V2 => "v2",
        }
    }
}

impl FromStr for ModelVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "v1" => Ok(ModelVersion::V1),
            "v2" => Ok(ModelVersion::V2),
            other => Err(AppError::Config(format!(
                "MODEL_VERSION must be 'v1' or 'v2', got '{other}'"
            ))),
        }
    }
}

/// Where a forecast gets its constants from.
#[derive(Clone)]
pub enum ConstantsSource {
    Local(ModelConstants),
    Remote(Arc<ApiClient>),
}

impl ConstantsSource {
    /// Resolve the constant bundle. Remote failures surface as
    /// `ConstantsUnavailable` and are not retried here.
    pub async fn resolve(&self) -> Result<ModelConstants> {
        match self {
            ConstantsSource::Local(c) => Ok(c.clone()),
            ConstantsSource::Remote(client) => client.fetch_constants().await.map_err(|e| {
                warn!("Constant resolution failed: {e}");
                AppError::ConstantsUnavailable(e.to_string())
            }),
        }
    }
}
