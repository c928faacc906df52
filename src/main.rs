use anyhow::Context;
use crypto_analytics::{
    config::AppConfig,
    router::build_router,
    services::{
        coingecko::CoinGeckoService,
        dataset::{DatasetKey, DatasetService},
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crypto_analytics=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        "Using market data API at {} (cache TTL {:?})",
        config.coingecko_base_url,
        config.cache_ttl
    );

    let coingecko = CoinGeckoService::new(&config).context("failed to build HTTP client")?;
    let datasets = DatasetService::new(Arc::new(coingecko), config.cache_ttl);

    if config.prefetch_on_start {
        let datasets = datasets.clone();
        let key = DatasetKey::new(config.default_vs_currency.clone(), config.default_target_size);
        tokio::spawn(async move {
            tracing::info!("Warming {}_{} dataset", key.vs_currency, key.target_size);
            let outcome = datasets.load(&key).await;
            if let Some(e) = outcome.error {
                tracing::warn!("Initial load failed, dashboard will start empty: {}", e);
            }
        });
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        datasets,
    };

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
