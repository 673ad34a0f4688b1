use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Holding, NewsItem, PricePoint, Quote, Ticker, TickerSet, TimeRange, Wishlist};

/// Why a fetch did not produce data.
///
/// A well-formed but empty payload is not an error; it is returned as an
/// empty `Vec`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("rate limited")]
    RateLimited,

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Network(_) => FailureKind::Network,
            FetchError::Malformed(_) => FailureKind::Malformed,
            FetchError::AuthRequired => FailureKind::AuthRequired,
            FetchError::RateLimited => FailureKind::RateLimited,
            FetchError::NotConfigured(_) => FailureKind::NotConfigured,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Malformed,
    AuthRequired,
    RateLimited,
    NotConfigured,
}

/// Cookie header the browser sent us, forwarded to credentialed endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerSession {
    pub cookie: Option<String>,
}

impl BrokerSession {
    pub fn new(cookie: Option<String>) -> Self {
        Self { cookie }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// The dashboard's REST backend: quotes, history, wishlists and the
/// brokerage session it fronts.
#[async_trait]
pub trait MarketBackend: Send + Sync {
    async fn fetch_quotes(&self, tickers: &TickerSet) -> Result<Vec<Quote>, FetchError>;

    /// `Ok(None)` when the backend knows nothing about the ticker.
    async fn fetch_quote(&self, ticker: &Ticker) -> Result<Option<Quote>, FetchError>;

    async fn fetch_history(
        &self,
        ticker: &Ticker,
        range: TimeRange,
    ) -> Result<Vec<PricePoint>, FetchError>;

    async fn list_wishlists(&self) -> Result<Vec<Wishlist>, FetchError>;

    async fn create_wishlist(&self, wishlist: &Wishlist) -> Result<Wishlist, FetchError>;

    async fn append_to_wishlist(&self, name: &str, symbols: &TickerSet) -> Result<(), FetchError>;

    async fn delete_wishlist(&self, id: &str) -> Result<(), FetchError>;

    async fn fetch_holdings(&self, session: &BrokerSession) -> Result<Vec<Holding>, FetchError>;

    async fn auth_check(&self, session: &BrokerSession) -> Result<AuthStatus, FetchError>;

    async fn logout(&self, session: &BrokerSession) -> Result<(), FetchError>;

    async fn store_api_credentials(&self, credentials: &BrokerCredentials) -> Result<(), FetchError>;
}

/// Source of ticker-tagged news with sentiment labels.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch_news(&self, tickers: &TickerSet) -> Result<Vec<NewsItem>, FetchError>;
}
