use std::sync::Arc;

mod alternative_client;
mod api;
mod binance_client;
mod blockchain_client;
mod cache;
mod cascade;
mod coingecko_client;
mod config;
mod error;
mod gateway;
mod history;
mod http_client;
mod indicators;
mod kraken_client;
mod math;
mod scoring;
mod series_cache;
mod signals;
mod snapshot;
mod types;
mod yahoo_client;

use config::Config;
use gateway::ProviderGateway;
use history::HistoryService;
use http_client::HttpFetcher;
use series_cache::HistoricalSeriesCache;
use snapshot::{SnapshotAssembler, SnapshotService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("🚀 Starting BTC Signal Backend...");

    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        "💼 Portfolio: {} BTC @ ${}",
        config.portfolio.btc_amount,
        config.portfolio.avg_price
    );

    // Providers
    let fetcher = Arc::new(HttpFetcher::new()?);
    let gateway = Arc::new(ProviderGateway::new(
        &config.providers,
        config.timeouts,
        fetcher,
    )?);
    tracing::info!("🔗 Price providers: {}", gateway.price_providers().join(" → "));

    // Caches and services
    let series = Arc::new(HistoricalSeriesCache::new(
        gateway.clone(),
        config.cache.series_ttl,
    ));
    let assembler = SnapshotAssembler::new(
        gateway.clone(),
        series,
        config.weights.clone(),
        config.portfolio.clone(),
    );
    let state = api::AppState {
        snapshots: Arc::new(SnapshotService::new(assembler, config.cache.snapshot_ttl)),
        history: Arc::new(HistoryService::new(gateway.clone(), config.cache.history_ttl)),
        gateway,
    };

    let app = api::create_router(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
