use std::sync::Arc;

use chrono::Datelike;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use powerlaw_dashboard::config::{Config, ConstantsMode};
use powerlaw_dashboard::dashboard::{forecast_panel, format_usd, Summary};
use powerlaw_dashboard::error::Result;
use powerlaw_dashboard::fetcher::{ApiClient, SeriesFetcher};
use powerlaw_dashboard::model::ConstantsSource;
use powerlaw_dashboard::refresh::SeriesRefresher;
use powerlaw_dashboard::telemetry::{FetchLatency, RefreshHealth};
use powerlaw_dashboard::types::SeriesSnapshot;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        version = %cfg.constants.version,
        "Power-law model: {} (start date {})",
        cfg.constants.formula(),
        cfg.constants.start_date_ms,
    );

    let latency = Arc::new(FetchLatency::new());
    let client = Arc::new(ApiClient::from_config(&cfg, Arc::clone(&latency))?);
    let fetcher = Arc::new(SeriesFetcher::new(
        Arc::clone(&client),
        cfg.constants.clone(),
        cfg.fallback_seed,
    ));

    let source = match cfg.constants_mode {
        ConstantsMode::Local => ConstantsSource::Local(cfg.constants.clone()),
        ConstantsMode::Remote => ConstantsSource::Remote(Arc::clone(&client)),
    };

    // Series refresher (immediately, then every refresh_interval)
    let health = Arc::new(RefreshHealth::new());
    let handle = SeriesRefresher::new(fetcher, cfg.refresh_interval, Arc::clone(&health)).spawn();
    info!(
        "Refreshing from {} every {}s",
        client.base_url(),
        cfg.refresh_interval.as_secs(),
    );

    let mut rx = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    warn!("Refresher exited unexpectedly");
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    report(&snapshot, &source, &latency, &health).await;
                }
            }
        }
    }

    handle.stop().await;
    Ok(())
}

/// Log one refresh: headline numbers, valuation banner and next year's forecast.
async fn report(
    snapshot: &SeriesSnapshot,
    source: &ConstantsSource,
    latency: &FetchLatency,
    health: &RefreshHealth,
) {
    let summary = Summary::of(snapshot);
    let price = summary.current_price.map(format_usd).unwrap_or_else(|| "unknown".to_string());

    match (summary.deviation, summary.valuation) {
        (Some(d), Some(v)) => info!(
            event = "VALUATION",
            valuation = %v,
            deviation = d,
            provenance = %summary.provenance,
            "{} | price: {} | deviation: {:+.1}% | {}",
            v.headline(),
            price,
            d,
            v.description(d),
        ),
        _ => warn!(
            provenance = %summary.provenance,
            "No deviation available (price: {price})"
        ),
    }
    if let Some(notice) = summary.notice() {
        warn!("{notice}");
    }

    let year = chrono::Utc::now().year() + 1;
    match forecast_panel(year, source, &snapshot.points).await {
        Ok(p) => info!(
            event = "FORECAST",
            year,
            base = p.base_projection,
            "Forecast {year}: {} - {} (base {}, fixed ±30% band)",
            format_usd(p.lower_bound),
            format_usd(p.upper_bound),
            format_usd(p.base_projection),
        ),
        Err(e) => warn!(year, "Forecast unavailable: {e}"),
    }

    if let Some((p50, p95, p99)) = latency.percentiles_ms() {
        info!(
            refreshes = health.refresh_count(),
            fallback_streak = health.consecutive_failures(),
            "Fetch latency p50={p50:.0}ms p95={p95:.0}ms p99={p99:.0}ms ({} samples)",
            latency.len(),
        );
    }
}
