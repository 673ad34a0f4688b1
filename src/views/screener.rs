use std::borrow::Cow;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::MarketBackend;
use crate::models::{Quote, QuoteView, Ticker, TickerSet};
use crate::services::derived_metrics::{market_indicators, MarketIndicators};
use crate::services::{
    compose, FailureCache, FailureType, FetchGate, PollPolicy, PollSession, PollStatus, SortValue,
    ViewQuery, ViewRow, ViewSnapshot,
};
use crate::views::{quotes_fetch, View, WishlistCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSort {
    #[default]
    Name,
    Price,
    Change,
    Pe,
    FromHigh,
}

impl ViewRow for Quote {
    type SortKey = QuoteSort;
    type Filter = ();

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(self.ticker.as_str()), Cow::Borrowed(&self.name)]
    }

    fn sort_value(&self, key: QuoteSort) -> SortValue<'_> {
        match key {
            // the list is labelled by symbol, so "name" orders by symbol
            QuoteSort::Name => SortValue::Text(Cow::Borrowed(self.ticker.as_str())),
            QuoteSort::Price => SortValue::Number(Some(self.current_price)),
            QuoteSort::Change => SortValue::Number(Some(self.change_pct)),
            QuoteSort::Pe => SortValue::Number(self.pe),
            QuoteSort::FromHigh => SortValue::Number(self.percent_from_high()),
        }
    }

    fn matches_filter(&self, _filter: &()) -> bool {
        true
    }
}

pub type QuoteQuery = ViewQuery<QuoteSort, ()>;

#[derive(Debug, Clone, Serialize)]
pub struct ScreenerSnapshot {
    #[serde(flatten)]
    pub view: ViewSnapshot<QuoteView>,
    pub tickers: TickerSet,
    pub wishlist: Option<String>,
    /// Computed over the rows currently visible.
    pub indicators: MarketIndicators,
    pub polling: Option<PollStatus>,
}

struct ScreenerState {
    tickers: TickerSet,
    wishlist: Option<String>,
    session: Option<PollSession>,
    torn_down: bool,
}

/// Live quote list for a set of tickers, refreshed by a bounded poll session.
pub struct ScreenerView {
    backend: Arc<dyn MarketBackend>,
    wishlists: WishlistCache,
    unknown: FailureCache,
    policy: PollPolicy,
    gate: FetchGate<TickerSet, Quote>,
    state: Mutex<ScreenerState>,
}

impl ScreenerView {
    pub fn new(
        backend: Arc<dyn MarketBackend>,
        wishlists: WishlistCache,
        unknown: FailureCache,
        policy: PollPolicy,
    ) -> Self {
        Self {
            backend,
            wishlists,
            unknown,
            policy,
            gate: FetchGate::new("screener"),
            state: Mutex::new(ScreenerState {
                tickers: TickerSet::new(),
                wishlist: None,
                session: None,
                torn_down: false,
            }),
        }
    }

    /// Replaces the ticker set. The old session is cancelled before the new
    /// one starts, and rows for the old set are dropped at once.
    pub fn set_tickers(&self, tickers: TickerSet) {
        self.switch(tickers, None);
    }

    pub async fn load_wishlist(&self, name: &str) -> Result<(), AppError> {
        let wishlist = self
            .wishlists
            .find_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("wishlist {:?}", name)))?;
        info!("Screener loading wishlist {:?} ({} symbols)", name, wishlist.symbols.len());
        self.switch(wishlist.symbols, Some(wishlist.name));
        Ok(())
    }

    /// Loads the union of every wishlist.
    pub async fn view_all(&self) -> Result<(), AppError> {
        let tickers = self.wishlists.all_symbols().await?;
        info!("Screener loading all wishlists ({} symbols)", tickers.len());
        self.switch(tickers, None);
        Ok(())
    }

    /// Adds one ticker after confirming the backend knows it.
    pub async fn add_ticker(&self, ticker: Ticker) -> Result<Quote, AppError> {
        if self.state.lock().tickers.contains(&ticker) {
            return Err(AppError::Validation(format!("{} is already in your list", ticker)));
        }
        if let Some(failure) = self.unknown.is_failed(&ticker) {
            return Err(match failure.error_type {
                FailureType::NotFound => AppError::NotFound(format!("ticker {}", ticker)),
                FailureType::RateLimited => AppError::RateLimited,
            });
        }

        let quote = match self.backend.fetch_quote(&ticker).await {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                warn!("Rejected unknown ticker {}", ticker);
                self.unknown.record_failure(&ticker, FailureType::NotFound);
                return Err(AppError::NotFound(format!("ticker {}", ticker)));
            }
            Err(e) => {
                if let Some(kind) = FailureType::from_fetch_error(&e) {
                    self.unknown.record_failure(&ticker, kind);
                }
                return Err(e.into());
            }
        };
        self.unknown.clear(&ticker);

        let (tickers, wishlist) = {
            let state = self.state.lock();
            if state.tickers.contains(&ticker) {
                return Err(AppError::Validation(format!("{} is already in your list", ticker)));
            }
            let mut tickers = state.tickers.clone();
            tickers.insert(ticker);
            (tickers, state.wishlist.clone())
        };
        self.switch(tickers, wishlist);
        Ok(quote)
    }

    /// Starts a fresh session for the current tickers once the previous one
    /// expired or stopped. Returns false when a session is still running or
    /// there is nothing to poll.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.torn_down || state.session.as_ref().is_some_and(PollSession::is_running) {
            return false;
        }
        if let Some(old) = state.session.take() {
            old.cancel();
        }
        state.session = PollSession::start(
            &self.gate,
            state.tickers.clone(),
            quotes_fetch(Arc::clone(&self.backend)),
            self.policy,
        );
        state.session.is_some()
    }

    pub fn tickers(&self) -> TickerSet {
        self.state.lock().tickers.clone()
    }

    pub fn snapshot(&self, query: &QuoteQuery) -> ScreenerSnapshot {
        let gate = self.gate.snapshot();
        let view = compose(&gate, query, |q: &Quote| QuoteView::from(q));
        let visible: Vec<Quote> = view.rows.iter().map(|row| row.quote.clone()).collect();

        let state = self.state.lock();
        ScreenerSnapshot {
            indicators: market_indicators(&visible),
            view,
            tickers: state.tickers.clone(),
            wishlist: state.wishlist.clone(),
            polling: state.session.as_ref().map(PollSession::status),
        }
    }

    fn switch(&self, tickers: TickerSet, wishlist: Option<String>) {
        let mut state = self.state.lock();
        if state.torn_down {
            return;
        }
        if let Some(old) = state.session.take() {
            old.cancel();
        }

        if tickers.is_empty() {
            self.gate.reset(None);
        } else {
            self.gate.reset(Some(tickers.clone()));
        }
        state.session = PollSession::start(
            &self.gate,
            tickers.clone(),
            quotes_fetch(Arc::clone(&self.backend)),
            self.policy,
        );
        state.tickers = tickers;
        state.wishlist = wishlist;
    }
}

impl View for ScreenerView {
    fn teardown(&self) {
        let mut state = self.state.lock();
        state.torn_down = true;
        if let Some(session) = state.session.take() {
            session.cancel();
        }
        self.gate.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{SortOrder, ViewStatus};
    use crate::views::testing::{quote, FakeBackend};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::time::sleep;

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(40), Some(Duration::from_millis(400)))
    }

    fn screener(backend: Arc<FakeBackend>) -> ScreenerView {
        let wishlists = WishlistCache::new(backend.clone());
        ScreenerView::new(backend, wishlists, FailureCache::new(), policy())
    }

    fn backend() -> Arc<FakeBackend> {
        Arc::new(FakeBackend::with_quotes(vec![
            quote("RELIANCE.NS", 2567.85, 32.45, Some(28.5)),
            quote("TCS.NS", 3500.0, -20.0, None),
            quote("INFY.NS", 1500.0, 10.0, Some(22.0)),
        ]))
    }

    fn set(symbols: &[&str]) -> TickerSet {
        TickerSet::parse(symbols.iter().copied()).unwrap()
    }

    #[tokio::test]
    async fn test_mount_with_tickers_loads_and_polls() {
        let backend = backend();
        let view = screener(backend.clone());
        view.set_tickers(set(&["RELIANCE.NS", "TCS.NS"]));

        sleep(Duration::from_millis(150)).await;
        let snap = view.snapshot(&QuoteQuery::default());
        assert_eq!(snap.view.status, ViewStatus::Ready);
        assert_eq!(snap.view.rows.len(), 2);
        assert_eq!(snap.polling, Some(PollStatus::Running));
        assert!(backend.quote_calls.load(Ordering::SeqCst) >= 2);
        view.teardown();
    }

    #[tokio::test]
    async fn test_empty_ticker_set_is_idle_without_fetching() {
        let backend = backend();
        let view = screener(backend.clone());
        view.set_tickers(TickerSet::new());

        sleep(Duration::from_millis(60)).await;
        let snap = view.snapshot(&QuoteQuery::default());
        assert_eq!(snap.view.status, ViewStatus::Idle);
        assert_eq!(snap.polling, None);
        assert_eq!(backend.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_switching_sets_never_shows_old_rows() {
        let backend = backend();
        backend.set_latency("RELIANCE.NS", Duration::from_millis(150));
        let view = screener(backend.clone());

        view.set_tickers(set(&["RELIANCE.NS"]));
        sleep(Duration::from_millis(20)).await;
        view.set_tickers(set(&["TCS.NS"]));

        sleep(Duration::from_millis(250)).await;
        let snap = view.snapshot(&QuoteQuery::default());
        let symbols: Vec<&str> = snap.view.rows.iter().map(|r| r.quote.ticker.as_str()).collect();
        assert_eq!(symbols, vec!["TCS.NS"]);
        view.teardown();
    }

    #[test]
    fn test_name_sort_orders_by_symbol() {
        let mut zeta = quote("AAA.NS", 10.0, 1.0, None);
        zeta.name = "Zeta Corp".into();
        let mut alpha = quote("ZZZ.NS", 10.0, 1.0, None);
        alpha.name = "Alpha Corp".into();
        let rows = vec![alpha, zeta];

        let query = QuoteQuery::default().sort(QuoteSort::Name, SortOrder::Asc);
        let sorted = crate::services::render(&rows, &query);
        let symbols: Vec<&str> = sorted.iter().map(|q| q.ticker.as_str()).collect();
        assert_eq!(symbols, vec!["AAA.NS", "ZZZ.NS"]);
    }

    #[tokio::test]
    async fn test_sort_and_indicators_follow_visible_rows() {
        let view = screener(backend());
        view.set_tickers(set(&["RELIANCE.NS", "TCS.NS", "INFY.NS"]));
        sleep(Duration::from_millis(80)).await;

        let snap = view.snapshot(&QuoteQuery::default().sort(QuoteSort::Pe, SortOrder::Desc));
        let symbols: Vec<&str> = snap.view.rows.iter().map(|r| r.quote.ticker.as_str()).collect();
        assert_eq!(symbols, vec!["RELIANCE.NS", "INFY.NS", "TCS.NS"]);
        assert_eq!(snap.indicators.total, 3);
        assert_eq!(snap.indicators.stocks_up, 2);
        assert_eq!(snap.indicators.avg_pe, Some(25.25));

        let snap = view.snapshot(&QuoteQuery::default().search("infy"));
        assert_eq!(snap.indicators.total, 1);
        assert_eq!(snap.view.total, 3);

        let snap = view.snapshot(&QuoteQuery::default().search("nothing-like-this"));
        assert_eq!(snap.view.status, ViewStatus::NoMatches);
        assert!(snap.view.rows.is_empty());
        view.teardown();
    }

    #[tokio::test]
    async fn test_add_ticker_verifies_and_rejects() {
        let backend = backend();
        let view = screener(backend.clone());
        view.set_tickers(set(&["TCS.NS"]));

        let added = view.add_ticker(Ticker::parse("infy.ns").unwrap()).await.unwrap();
        assert_eq!(added.ticker.as_str(), "INFY.NS");
        assert_eq!(view.tickers().to_csv(), "TCS.NS,INFY.NS");

        let dup = view.add_ticker(Ticker::parse("TCS.NS").unwrap()).await;
        assert!(matches!(dup, Err(AppError::Validation(_))));

        let unknown = view.add_ticker(Ticker::parse("NOPE.NS").unwrap()).await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
        assert_eq!(view.tickers().len(), 2);
        view.teardown();
    }

    #[tokio::test]
    async fn test_window_expiry_then_resume() {
        let backend = backend();
        let view = ScreenerView::new(
            backend.clone(),
            WishlistCache::new(backend.clone()),
            FailureCache::new(),
            PollPolicy::new(Duration::from_millis(20), Some(Duration::from_millis(60))),
        );
        view.set_tickers(set(&["TCS.NS"]));

        sleep(Duration::from_millis(150)).await;
        assert_eq!(view.snapshot(&QuoteQuery::default()).polling, Some(PollStatus::Expired));
        let calls = backend.quote_calls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.quote_calls.load(Ordering::SeqCst), calls);

        assert!(view.resume());
        assert!(!view.resume());
        sleep(Duration::from_millis(30)).await;
        assert!(backend.quote_calls.load(Ordering::SeqCst) > calls);
        view.teardown();
    }

    #[tokio::test]
    async fn test_teardown_with_fetch_in_flight() {
        let backend = backend();
        backend.set_latency("TCS.NS", Duration::from_millis(80));
        let view = screener(backend.clone());
        view.set_tickers(set(&["TCS.NS"]));

        sleep(Duration::from_millis(20)).await;
        view.teardown();
        view.teardown();

        sleep(Duration::from_millis(150)).await;
        let snap = view.snapshot(&QuoteQuery::default());
        assert_eq!(snap.view.status, ViewStatus::Loading);
        assert_eq!(snap.polling, None);
        assert_eq!(backend.quote_calls.load(Ordering::SeqCst), 1);

        // a torn-down view ignores further input
        view.set_tickers(set(&["INFY.NS"]));
        assert!(!view.resume());
        assert_eq!(view.tickers().to_csv(), "TCS.NS");
    }

    #[tokio::test]
    async fn test_load_wishlist_by_name() {
        let backend = backend();
        backend.add_wishlist("w1", "Indian IT", &["TCS.NS", "INFY.NS"]);
        let view = screener(backend.clone());

        view.load_wishlist("Indian IT").await.unwrap();
        let snap = view.snapshot(&QuoteQuery::default());
        assert_eq!(snap.tickers.to_csv(), "TCS.NS,INFY.NS");
        assert_eq!(snap.wishlist.as_deref(), Some("Indian IT"));

        let missing = view.load_wishlist("Nope").await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
        view.teardown();
    }
}
