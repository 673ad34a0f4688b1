use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::DashboardConfig;
use crate::external::{MarketBackend, NewsProvider};
use crate::services::FailureCache;
use crate::views::{
    MultiGraphView, NewsView, PortfolioView, RecommendationBook, ScreenerView, ViewRegistry,
    WishlistCache,
};

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn MarketBackend>,
    pub news_provider: Option<Arc<dyn NewsProvider>>,
    pub config: Arc<DashboardConfig>,
    pub wishlists: WishlistCache,
    /// Tickers the backend did not recognise, shared by every screener.
    pub unknown_tickers: FailureCache,
    pub recommendations: RecommendationBook,
    pub screeners: ViewRegistry<ScreenerView>,
    pub graphs: ViewRegistry<MultiGraphView>,
    pub portfolios: ViewRegistry<PortfolioView>,
    pub news: ViewRegistry<NewsView>,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn MarketBackend>,
        news_provider: Option<Arc<dyn NewsProvider>>,
        config: DashboardConfig,
        recommendations: RecommendationBook,
    ) -> Self {
        Self {
            wishlists: WishlistCache::new(Arc::clone(&backend)),
            backend,
            news_provider,
            config: Arc::new(config),
            unknown_tickers: FailureCache::new(),
            recommendations,
            screeners: ViewRegistry::new("screener"),
            graphs: ViewRegistry::new("multi_graph"),
            portfolios: ViewRegistry::new("portfolio"),
            news: ViewRegistry::new("news"),
        }
    }

    /// Unmounts views of every kind idle for at least `ttl`.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.screeners.evict_idle(ttl)
            + self.graphs.evict_idle(ttl)
            + self.portfolios.evict_idle(ttl)
            + self.news.evict_idle(ttl)
    }

    /// Spawns the background sweep of abandoned views, or nothing when the
    /// idle TTL is disabled.
    pub fn spawn_idle_sweep(&self) -> Option<JoinHandle<()>> {
        let ttl = self.config.view_idle_ttl?;
        let every = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
        let state = self.clone();
        info!(ttl_secs = ttl.as_secs(), sweep_secs = every.as_secs(), "Starting idle view sweep");

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = state.evict_idle(ttl);
                if evicted > 0 {
                    info!("Evicted {} idle views", evicted);
                }
            }
        }))
    }

    /// Tears down every mounted view. Called on shutdown.
    pub fn unmount_all(&self) {
        self.screeners.unmount_all();
        self.graphs.unmount_all();
        self.portfolios.unmount_all();
        self.news.unmount_all();
    }
}
