use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use marketdash::app;
use marketdash::config::DashboardConfig;
use marketdash::external::alphavantage::AlphaVantageNewsProvider;
use marketdash::external::backend::BackendClient;
use marketdash::external::{MarketBackend, NewsProvider};
use marketdash::logging::{init_logging, LoggingConfig};
use marketdash::state::AppState;
use marketdash::views::RecommendationBook;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = DashboardConfig::from_env().context("invalid configuration")?;

    let backend: Arc<dyn MarketBackend> = Arc::new(BackendClient::new(config.backend_api_url.clone()));
    info!("📊 Market backend: {}", config.backend_api_url);

    let news_provider: Option<Arc<dyn NewsProvider>> = match &config.news_api_key {
        Some(key) => {
            info!("📰 News provider: {}", config.news_api_url);
            Some(Arc::new(AlphaVantageNewsProvider::new(
                config.news_api_url.clone(),
                key.clone(),
            )))
        }
        None => {
            warn!("NEWS_API_KEY is not set, news views will report a configuration error");
            None
        }
    };

    let recommendations = match &config.recommendations_file {
        Some(path) => RecommendationBook::from_file(path)
            .with_context(|| format!("failed to load recommendations from {}", path.display()))?,
        None => RecommendationBook::default(),
    };

    let addr = config.bind_addr;
    let state = AppState::new(backend, news_provider, config, recommendations);
    let app = app::create_app(state.clone());
    let sweep = state.spawn_idle_sweep();

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("🚀 Market dashboard running at http://{}/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweep) = sweep {
        sweep.abort();
    }
    state.unmount_all();
    info!("Shut down, all views unmounted");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
