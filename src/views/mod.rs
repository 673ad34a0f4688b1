//! Mounted views. Each owns its gates and poll sessions and renders JSON
//! snapshots for the browser.

pub mod multi_graph;
pub mod news;
pub mod portfolio;
pub mod recommendations;
pub mod screener;
mod registry;
mod wishlists;

use std::sync::Arc;

use futures::FutureExt;

use crate::external::MarketBackend;
use crate::models::{Quote, TickerSet};
use crate::services::FetchFn;

pub use multi_graph::MultiGraphView;
pub use news::NewsView;
pub use portfolio::PortfolioView;
pub use recommendations::RecommendationBook;
pub use registry::{View, ViewRegistry};
pub use screener::ScreenerView;
pub use wishlists::WishlistCache;

/// Quote fetch for a ticker set, shared by the screener and multi graph.
pub(crate) fn quotes_fetch(backend: Arc<dyn MarketBackend>) -> FetchFn<TickerSet, Quote> {
    Arc::new(move |tickers: TickerSet| {
        let backend = Arc::clone(&backend);
        async move { backend.fetch_quotes(&tickers).await }.boxed()
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process fakes of the client traits.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use parking_lot::Mutex;

    use crate::external::{
        AuthStatus, BrokerCredentials, BrokerSession, FetchError, MarketBackend, NewsProvider,
    };
    use crate::models::{
        Holding, NewsItem, PricePoint, Quote, Sentiment, Ticker, TickerSet, TimeRange, Wishlist,
    };

    pub fn quote(symbol: &str, price: f64, change: f64, pe: Option<f64>) -> Quote {
        Quote {
            ticker: Ticker::parse(symbol).unwrap(),
            name: format!("{} Ltd.", symbol),
            current_price: price,
            change_abs: change,
            change_pct: change / price * 100.0,
            week_high_52: price * 1.25,
            week_low_52: price * 0.75,
            pe,
            sector: "Technology".into(),
            timestamp: Utc::now(),
        }
    }

    pub fn holding(symbol: &str, quantity: f64, avg: f64, last: f64) -> Holding {
        Holding {
            ticker: Ticker::parse(symbol).unwrap(),
            name: symbol.into(),
            quantity,
            avg_price: avg,
            current_price: last,
            day_change_pct: 0.5,
            sector: "Energy".into(),
            pe: None,
        }
    }

    pub fn news_item(id: &str, title: &str, sentiment: Sentiment, day: u32) -> NewsItem {
        NewsItem {
            id: id.into(),
            title: title.into(),
            excerpt: format!("{} excerpt", title),
            source: "Wire".into(),
            published_at: NaiveDate::from_ymd_opt(2025, 3, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()
                .and_utc(),
            sentiment,
            related_tickers: TickerSet::parse(["AAPL"]).unwrap(),
            url: format!("https://news.example.com/{}", id),
            image_url: None,
        }
    }

    /// Backend fake with per-call latency and call counters.
    #[derive(Default)]
    pub struct FakeBackend {
        pub quotes: Mutex<HashMap<Ticker, Quote>>,
        pub wishlists: Mutex<Vec<Wishlist>>,
        pub holdings: Mutex<Vec<Holding>>,
        pub holdings_error: Mutex<Option<FetchError>>,
        pub authenticated: Mutex<bool>,
        pub latency: Mutex<HashMap<String, Duration>>,
        pub quote_calls: AtomicUsize,
        pub history_calls: AtomicUsize,
        pub wishlist_calls: AtomicUsize,
        pub holdings_calls: AtomicUsize,
    }

    impl FakeBackend {
        pub fn with_quotes(quotes: Vec<Quote>) -> Self {
            let backend = Self::default();
            {
                let mut map = backend.quotes.lock();
                for q in quotes {
                    map.insert(q.ticker.clone(), q);
                }
            }
            backend
        }

        pub fn add_wishlist(&self, id: &str, name: &str, symbols: &[&str]) {
            self.wishlists.lock().push(Wishlist {
                id: id.into(),
                name: name.into(),
                symbols: TickerSet::parse(symbols.iter().copied()).unwrap(),
            });
        }

        /// Delay applied to fetches whose key (csv or ticker) equals `key`.
        pub fn set_latency(&self, key: &str, delay: Duration) {
            self.latency.lock().insert(key.to_string(), delay);
        }

        async fn delay_for(&self, key: &str) {
            let delay = self.latency.lock().get(key).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl MarketBackend for FakeBackend {
        async fn fetch_quotes(&self, tickers: &TickerSet) -> Result<Vec<Quote>, FetchError> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            self.delay_for(&tickers.to_csv()).await;
            let map = self.quotes.lock();
            Ok(tickers.iter().filter_map(|t| map.get(t).cloned()).collect())
        }

        async fn fetch_quote(&self, ticker: &Ticker) -> Result<Option<Quote>, FetchError> {
            Ok(self.quotes.lock().get(ticker).cloned())
        }

        async fn fetch_history(
            &self,
            ticker: &Ticker,
            range: TimeRange,
        ) -> Result<Vec<PricePoint>, FetchError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            self.delay_for(&format!("{}:{}", ticker, range)).await;
            let base = match range {
                TimeRange::OneDay => 10.0,
                _ => 100.0,
            };
            Ok((1..=3)
                .map(|d| PricePoint {
                    date: NaiveDate::from_ymd_opt(2025, 1, d).unwrap(),
                    price: base + d as f64,
                })
                .collect())
        }

        /// Reads before the "wishlists" latency, so a slow read returns what
        /// was stored when it started.
        async fn list_wishlists(&self) -> Result<Vec<Wishlist>, FetchError> {
            self.wishlist_calls.fetch_add(1, Ordering::SeqCst);
            let lists = self.wishlists.lock().clone();
            self.delay_for("wishlists").await;
            Ok(lists)
        }

        async fn create_wishlist(&self, wishlist: &Wishlist) -> Result<Wishlist, FetchError> {
            self.wishlists.lock().push(wishlist.clone());
            Ok(wishlist.clone())
        }

        async fn append_to_wishlist(&self, name: &str, symbols: &TickerSet) -> Result<(), FetchError> {
            let mut lists = self.wishlists.lock();
            match lists.iter_mut().find(|w| w.name == name) {
                Some(w) => {
                    w.symbols.extend(symbols.iter().cloned());
                    Ok(())
                }
                None => Err(FetchError::Network(format!("no wishlist named {}", name))),
            }
        }

        async fn delete_wishlist(&self, id: &str) -> Result<(), FetchError> {
            self.wishlists.lock().retain(|w| w.id != id);
            Ok(())
        }

        async fn fetch_holdings(&self, _session: &BrokerSession) -> Result<Vec<Holding>, FetchError> {
            self.holdings_calls.fetch_add(1, Ordering::SeqCst);
            match self.holdings_error.lock().clone() {
                Some(e) => Err(e),
                None => Ok(self.holdings.lock().clone()),
            }
        }

        async fn auth_check(&self, _session: &BrokerSession) -> Result<AuthStatus, FetchError> {
            let authenticated = *self.authenticated.lock();
            Ok(AuthStatus {
                authenticated,
                error: (!authenticated).then(|| "token expired".to_string()),
            })
        }

        async fn logout(&self, _session: &BrokerSession) -> Result<(), FetchError> {
            *self.authenticated.lock() = false;
            Ok(())
        }

        async fn store_api_credentials(&self, _credentials: &BrokerCredentials) -> Result<(), FetchError> {
            Ok(())
        }
    }

    pub struct FakeNews {
        pub items: Mutex<Result<Vec<NewsItem>, FetchError>>,
        pub calls: AtomicUsize,
    }

    impl FakeNews {
        pub fn new(items: Result<Vec<NewsItem>, FetchError>) -> Self {
            Self {
                items: Mutex::new(items),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NewsProvider for FakeNews {
        async fn fetch_news(&self, _tickers: &TickerSet) -> Result<Vec<NewsItem>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.items.lock().clone()
        }
    }
}
