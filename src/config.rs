use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::model::constants::{ModelConstants, ModelVersion};

pub const API_BASE_URL: &str = "http://localhost:8000/api";

/// Series refresh interval (seconds): how often the dashboard re-fetches history.
pub const REFRESH_INTERVAL_SECS: u64 = 300;

/// Per-request timeout for the remote data service (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Fallback series: one synthetic point per this many days.
pub const FALLBACK_STEP_DAYS: i64 = 7;

/// Fallback series: how many calendar years of history to synthesize.
pub const FALLBACK_YEARS: u32 = 5;

pub const MS_PER_DAY: i64 = 86_400_000;

/// Forecast years offered by the dashboard's year selector.
pub const FORECAST_YEARS: std::ops::RangeInclusive<i32> = 2024..=2035;

/// Deviation thresholds (percent) for the valuation banner.
pub mod valuation_thresholds {
    pub const OVERVALUED_ABOVE: f64 = 30.0;
    pub const UNDERVALUED_BELOW: f64 = -30.0;
}

/// Where forecasts get their model constants from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantsMode {
    /// Use the constants injected at startup.
    Local,
    /// Resolve from `GET /api/constants` on each forecast.
    Remote,
}

impl FromStr for ConstantsMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ConstantsMode::Local),
            "remote" => Ok(ConstantsMode::Remote),
            other => Err(AppError::Config(format!(
                "CONSTANTS_SOURCE must be 'local' or 'remote', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub log_level: String,
    pub refresh_interval: Duration,
    pub http_timeout: Duration,
    /// The single constant bundle every calculation in the process uses.
    pub constants: ModelConstants,
    pub constants_mode: ConstantsMode,
    /// Seed for the fallback generator (FALLBACK_SEED). Unseeded when absent.
    pub fallback_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Missing keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let version: ModelVersion = get_or("MODEL_VERSION", "v2").parse()?;
        let preset = version.preset();

        let constants = ModelConstants::new(
            version.label(),
            lookup_parse(&lookup, "MODEL_A", preset.a)?,
            lookup_parse(&lookup, "MODEL_B", preset.b)?,
            lookup_parse(&lookup, "MODEL_START_DATE_MS", preset.start_date_ms)?,
            lookup_parse(&lookup, "MODEL_SCALE", preset.scale)?,
        )?;

        let refresh_secs: u64 =
            lookup_parse(&lookup, "REFRESH_INTERVAL_SECS", REFRESH_INTERVAL_SECS)?;
        if refresh_secs == 0 {
            return Err(AppError::Config(
                "REFRESH_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let timeout_secs: u64 = lookup_parse(&lookup, "HTTP_TIMEOUT_SECS", HTTP_TIMEOUT_SECS)?;

        Ok(Self {
            api_base_url: get_or("API_BASE_URL", API_BASE_URL).trim_end_matches('/').to_string(),
            log_level: get_or("LOG_LEVEL", "info"),
            refresh_interval: Duration::from_secs(refresh_secs),
            http_timeout: Duration::from_secs(timeout_secs),
            constants,
            constants_mode: get_or("CONSTANTS_SOURCE", "local").parse()?,
            fallback_seed: match lookup("FALLBACK_SEED") {
                Some(raw) => Some(parse_value("FALLBACK_SEED", &raw)?),
                None => None,
            },
        })
    }
}

fn lookup_parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::Config(format!("{key} has an invalid value: '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;


    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_v2_preset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.constants, ModelVersion::V2.preset());
        assert_eq!(cfg.api_base_url, API_BASE_URL);
        assert_eq!(cfg.refresh_interval, Duration::from_secs(300));
        assert_eq!(cfg.http_timeout, Duration::from_secs(10));
        assert_eq!(cfg.constants_mode, ConstantsMode::Local);
        assert_eq!(cfg.fallback_seed, None);
    }

    #[test]
    fn v1_preset_is_selected_by_version() {
        let cfg = Config::from_lookup(lookup(&[("MODEL_VERSION", "V1")])).unwrap();
        assert_eq!(cfg.constants, ModelVersion::V1.preset());
        assert_eq!(cfg.constants.scale, 1.0);
    }

    #[test]
    fn individual_constants_override_the_preset() {
        let cfg = Config::from_lookup(lookup(&[
            ("MODEL_VERSION", "v1"),
            ("MODEL_A", "0.02"),
            ("MODEL_B", "1.9"),
            ("MODEL_SCALE", "2"),
            ("MODEL_START_DATE_MS", "1000"),
            ("API_BASE_URL", "http://example.test/api/"),
            ("CONSTANTS_SOURCE", "remote"),
            ("FALLBACK_SEED", "7"),
        ]))
        .unwrap();
        assert_eq!(cfg.constants.version, "v1");
        assert_eq!(cfg.constants.a, 0.02);
        assert_eq!(cfg.constants.b, 1.9);
        assert_eq!(cfg.constants.scale, 2.0);
        assert_eq!(cfg.constants.start_date_ms, 1000);
        assert_eq!(cfg.api_base_url, "http://example.test/api");
        assert_eq!(cfg.constants_mode, ConstantsMode::Remote);
        assert_eq!(cfg.fallback_seed, Some(7));
    }

    #[test]
    fn zero_refresh_interval_is_rejected() {
        let err = Config::from_lookup(lookup(&[("REFRESH_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "got {err}");
    }

    #[test]
    fn invalid_settings_are_config_errors() {
        for pairs in [
            [("MODEL_VERSION", "v3")],
            [("MODEL_A", "-1")],
            [("MODEL_SCALE", "abc")],
            [("FALLBACK_SEED", "seed")],
        ] {
            let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "{pairs:?} gave {err}");
        }
    }

    #[test]
    fn constants_mode_parses_case_insensitively() {
        assert_eq!("Remote".parse::<ConstantsMode>().unwrap(), ConstantsMode::Remote);
        assert_eq!(" local ".parse::<ConstantsMode>().unwrap(), ConstantsMode::Local);
        assert!("cloud".parse::<ConstantsMode>().is_err());
    }

    #[test]
    fn parse_value_reports_the_key() {
        let err = parse_value::<f64>("MODEL_A", "abc").unwrap_err();
        assert!(err.to_string().contains("MODEL_A"), "got {err}");
        assert_eq!(parse_value::<u64>("X", " 42 ").unwrap(), 42);
    }
}
