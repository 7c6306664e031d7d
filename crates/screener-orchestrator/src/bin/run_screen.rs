use std::sync::Arc;

use anyhow::{Context, Result};
use fmp_client::{CachedProvider, FmpClient, ResponseCache};
use screener_core::{ClientConfig, Decision, ScreenerConfig};
use screener_orchestrator::{universe, CancelHandle, QualitativeSource, ScreeningOrchestrator, StaticQualitativeSource};

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

fn load_config() -> Result<ScreenerConfig> {
    let mut config = match std::env::var("SCREENER_CONFIG") {
        Ok(path) => {
            let mut config = ScreenerConfig::from_json_file(&path)?;
            // The key never lives in the config file
            config.client.api_key = ClientConfig::from_env()?.api_key;
            config
        }
        Err(_) => ScreenerConfig {
            client: ClientConfig::from_env()?,
            ..Default::default()
        },
    };
    if let Ok(url) = std::env::var("SCREENER_CACHE_DB") {
        config.cache.database_url = url;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting quality + value screen");

    let config = Arc::new(load_config()?);
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Rate limit: {}/min", config.client.rate_limit_per_minute);
    tracing::info!("  Concurrency: {}", config.ingestion.max_concurrency);
    tracing::info!("  Ticker timeout: {}s", config.ingestion.ticker_timeout_secs);
    tracing::info!("  Cache: {}", if config.cache.enabled { config.cache.database_url.as_str() } else { "disabled" });

    let source = std::env::var("SCREENER_UNIVERSE").context("SCREENER_UNIVERSE is not set")?;
    let entries = universe::load(&source)?;
    if entries.is_empty() {
        anyhow::bail!("SCREENER_UNIVERSE resolved to an empty universe");
    }

    let cache = ResponseCache::new(&config.cache.database_url).await?;
    match cache.purge_expired().await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Purged {} expired cache entries", n),
        Err(e) => tracing::warn!("Cache purge failed: {}", e),
    }

    // One flag for both the ticker tasks and the HTTP retry loop
    let cancel = CancelHandle::default();
    let provider = Arc::new(CachedProvider::new(
        FmpClient::new(&config.client).with_cancel(cancel.clone()),
        cache,
        config.cache.clone(),
    ));
    let mut orchestrator =
        ScreeningOrchestrator::new(provider.clone(), Arc::clone(&config)).with_cancel_handle(cancel.clone());

    if let Ok(path) = std::env::var("SCREENER_QUALITATIVE") {
        let summaries = StaticQualitativeSource::from_json_file(&path)?;
        tracing::info!("Loaded {} qualitative summaries", summaries.len());
        let summaries: Arc<dyn QualitativeSource> = Arc::new(summaries);
        orchestrator = orchestrator.with_qualitative(summaries);
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, finishing in-flight requests");
            cancel.cancel();
        }
    });

    let report = orchestrator.run(entries).await?;

    let output = std::env::var("SCREENER_OUTPUT").unwrap_or_else(|_| "screener_results.csv".to_string());
    report.write_csv(&output)?;

    tracing::info!("Summary: {}", report.failures);
    tracing::info!(
        "  BUY {} | MONITOR {} | AVOID {} | ERROR {}",
        report.count_decision(Decision::Buy),
        report.count_decision(Decision::Monitor),
        report.count_decision(Decision::Avoid),
        report.count_decision(Decision::Error)
    );
    let stats = provider.cache().stats();
    tracing::info!(
        "  Cache: {} hits, {} misses, {} errors ({:.0}% hit rate)",
        stats.hits,
        stats.misses,
        stats.errors,
        stats.hit_rate() * 100.0
    );
    for (endpoint, count) in provider.inner().requests_by_endpoint() {
        tracing::info!("  {}: {} requests", endpoint, count);
    }

    if report.cancelled {
        tracing::warn!("Screen was interrupted; results are partial");
    }
    Ok(())
}
