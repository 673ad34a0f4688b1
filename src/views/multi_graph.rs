use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::external::MarketBackend;
use crate::models::{HistoricalSeries, PricePoint, Quote, QuoteView, SeriesBounds, Ticker, TickerSet, TimeRange};
use crate::services::{
    compose, status_of, ErrorInfo, FetchGate, GraphSelection, LoadState, ViewSnapshot, ViewStatus,
};
use crate::views::screener::QuoteQuery;
use crate::views::{View, WishlistCache};

type HistoryKey = (Ticker, TimeRange);

struct GraphSlot {
    range: TimeRange,
    gate: FetchGate<HistoryKey, PricePoint>,
}

/// One chart card.
#[derive(Debug, Clone, Serialize)]
pub struct GraphCard {
    pub ticker: Ticker,
    pub quote: Option<QuoteView>,
    pub range: TimeRange,
    pub maximized: bool,
    pub status: ViewStatus,
    pub message: &'static str,
    pub error: Option<ErrorInfo>,
    /// Tagged with the pair it was fetched for, which may still trail `range`
    /// while a range change loads.
    pub series: HistoricalSeries,
    pub bounds: Option<SeriesBounds>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiGraphSnapshot {
    /// Loaded quotes not yet on a chart, after search.
    pub available: ViewSnapshot<QuoteView>,
    pub selected: Vec<Ticker>,
    pub maximized: Option<Ticker>,
    pub limit: usize,
    /// Cards on screen: every selected graph, or just the maximized one.
    pub graphs: Vec<GraphCard>,
}

struct GraphState {
    selection: GraphSelection,
    slots: HashMap<Ticker, GraphSlot>,
    torn_down: bool,
}

/// Side-by-side price history charts for a handful of tickers.
///
/// Each chart owns a history gate keyed by (ticker, range); a range change is
/// a new key, so the previous series is dropped rather than merged.
pub struct MultiGraphView {
    backend: Arc<dyn MarketBackend>,
    wishlists: WishlistCache,
    quotes: FetchGate<TickerSet, Quote>,
    state: Mutex<GraphState>,
}

impl MultiGraphView {
    pub fn new(backend: Arc<dyn MarketBackend>, wishlists: WishlistCache, limit: usize) -> Self {
        Self {
            backend,
            wishlists,
            quotes: FetchGate::new("multi_graph_quotes"),
            state: Mutex::new(GraphState {
                selection: GraphSelection::new(limit),
                slots: HashMap::new(),
                torn_down: false,
            }),
        }
    }

    /// Makes a wishlist's quotes available for charting. The selection is kept.
    pub async fn load_wishlist(&self, name: &str) -> Result<(), AppError> {
        let wishlist = self
            .wishlists
            .find_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("wishlist {:?}", name)))?;
        self.load_quotes(wishlist.symbols).await;
        Ok(())
    }

    /// Loads every wishlist's quotes and charts as many as the limit allows.
    pub async fn view_all(&self) -> Result<Vec<Ticker>, AppError> {
        let tickers = self.wishlists.all_symbols().await?;
        self.load_quotes(tickers).await;

        let loaded: Vec<Ticker> = self
            .quotes
            .snapshot()
            .state
            .rows()
            .iter()
            .map(|q| q.ticker.clone())
            .collect();

        let mut added = Vec::new();
        for ticker in loaded {
            if self.select(ticker.clone()).is_ok() {
                added.push(ticker);
            }
        }
        Ok(added)
    }

    async fn load_quotes(&self, tickers: TickerSet) {
        if self.state.lock().torn_down {
            return;
        }
        if tickers.is_empty() {
            self.quotes.reset(None);
            return;
        }
        info!("Multi graph loading {} quotes", tickers.len());
        let backend = Arc::clone(&self.backend);
        let key = tickers.clone();
        self.quotes
            .run(key, async move { backend.fetch_quotes(&tickers).await })
            .await;
    }

    /// Puts a loaded ticker on a chart and starts fetching its history.
    pub fn select(&self, ticker: Ticker) -> Result<(), AppError> {
        let available = self
            .quotes
            .snapshot()
            .state
            .rows()
            .iter()
            .any(|q| q.ticker == ticker);
        if !available {
            return Err(AppError::NotFound(format!("{} is not loaded", ticker)));
        }

        let mut state = self.state.lock();
        if state.torn_down {
            return Err(AppError::NotFound("view".to_string()));
        }
        state
            .selection
            .add(ticker.clone())
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let slot = GraphSlot {
            range: TimeRange::default(),
            gate: FetchGate::new("multi_graph_history"),
        };
        self.fetch_history(&slot.gate, ticker.clone(), slot.range);
        state.slots.insert(ticker, slot);
        Ok(())
    }

    /// Takes a chart off screen; its history fetch is abandoned.
    pub fn deselect(&self, ticker: &Ticker) -> bool {
        let mut state = self.state.lock();
        if !state.selection.remove(ticker) {
            return false;
        }
        if let Some(slot) = state.slots.remove(ticker) {
            slot.gate.close();
        }
        true
    }

    pub fn toggle_maximize(&self, ticker: &Ticker) -> Result<Option<Ticker>, AppError> {
        let mut state = self.state.lock();
        if !state.selection.toggle_maximize(ticker) {
            return Err(AppError::NotFound(format!("{} is not selected", ticker)));
        }
        Ok(state.selection.maximized().cloned())
    }

    /// Switches one chart's range, discarding the series for the old range.
    pub fn set_range(&self, ticker: &Ticker, range: TimeRange) -> Result<(), AppError> {
        let mut state = self.state.lock();
        let slot = state
            .slots
            .get_mut(ticker)
            .ok_or_else(|| AppError::NotFound(format!("{} is not selected", ticker)))?;
        if slot.range == range {
            return Ok(());
        }
        slot.range = range;
        self.fetch_history(&slot.gate, ticker.clone(), range);
        Ok(())
    }

    fn fetch_history(&self, gate: &FetchGate<HistoryKey, PricePoint>, ticker: Ticker, range: TimeRange) {
        let backend = Arc::clone(&self.backend);
        let key = (ticker.clone(), range);
        gate.spawn(key, async move { backend.fetch_history(&ticker, range).await });
    }

    pub fn snapshot(&self, query: &QuoteQuery) -> MultiGraphSnapshot {
        let mut quotes = self.quotes.snapshot();
        let state = self.state.lock();

        let loaded: HashMap<Ticker, Quote> = quotes
            .state
            .rows()
            .iter()
            .map(|q| (q.ticker.clone(), q.clone()))
            .collect();

        if let LoadState::Ready(rows) = &mut quotes.state {
            rows.retain(|q| !state.selection.contains(&q.ticker));
        }
        let available = compose(&quotes, query, |q: &Quote| QuoteView::from(q));

        let graphs = state
            .selection
            .visible()
            .into_iter()
            .filter_map(|ticker| {
                let slot = state.slots.get(ticker)?;
                let history = slot.gate.snapshot();
                let (status, error) = status_of(&history.state);
                let (series_ticker, series_range) =
                    history.key.clone().unwrap_or_else(|| (ticker.clone(), slot.range));
                let series = HistoricalSeries {
                    ticker: series_ticker,
                    range: series_range,
                    points: history.state.rows().to_vec(),
                };
                Some(GraphCard {
                    ticker: ticker.clone(),
                    quote: loaded.get(ticker).map(QuoteView::from),
                    range: slot.range,
                    maximized: state.selection.maximized() == Some(ticker),
                    status,
                    message: status.message(),
                    error,
                    bounds: series.bounds(),
                    series,
                    updated_at: history.updated_at,
                })
            })
            .collect();

        MultiGraphSnapshot {
            available,
            selected: state.selection.selected().to_vec(),
            maximized: state.selection.maximized().cloned(),
            limit: state.selection.limit(),
            graphs,
        }
    }
}

impl View for MultiGraphView {
    fn teardown(&self) {
        let mut state = self.state.lock();
        state.torn_down = true;
        for (_, slot) in state.slots.drain() {
            slot.gate.close();
        }
        self.quotes.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::testing::{quote, FakeBackend};
    use std::time::Duration;
    use tokio::time::sleep;

    fn t(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    fn setup(limit: usize) -> (Arc<FakeBackend>, MultiGraphView) {
        let backend = Arc::new(FakeBackend::with_quotes(vec![
            quote("AAPL", 190.0, 1.0, Some(30.0)),
            quote("MSFT", 410.0, -2.0, Some(35.0)),
            quote("NVDA", 880.0, 12.0, Some(70.0)),
        ]));
        backend.add_wishlist("1", "US Tech", &["AAPL", "MSFT", "NVDA"]);
        let view = MultiGraphView::new(backend.clone(), WishlistCache::new(backend.clone()), limit);
        (backend, view)
    }

    #[tokio::test]
    async fn test_selecting_fetches_history() {
        let (_backend, view) = setup(6);
        view.load_wishlist("US Tech").await.unwrap();
        view.select(t("AAPL")).unwrap();

        sleep(Duration::from_millis(50)).await;
        let snap = view.snapshot(&QuoteQuery::default());
        assert_eq!(snap.graphs.len(), 1);
        let card = &snap.graphs[0];
        assert_eq!(card.status, ViewStatus::Ready);
        assert_eq!(card.range, TimeRange::OneYear);
        assert_eq!(card.series.points.len(), 3);
        assert_eq!(card.series.range, TimeRange::OneYear);
        assert_eq!(card.bounds.unwrap().max, 103.0);
        // selected tickers leave the available list
        assert_eq!(snap.available.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_range_change_drops_old_series() {
        let (backend, view) = setup(6);
        backend.set_latency("AAPL:1Y", Duration::from_millis(150));
        view.load_wishlist("US Tech").await.unwrap();
        view.select(t("AAPL")).unwrap();

        sleep(Duration::from_millis(20)).await;
        view.set_range(&t("AAPL"), TimeRange::OneDay).unwrap();

        sleep(Duration::from_millis(250)).await;
        let card = view.snapshot(&QuoteQuery::default()).graphs.remove(0);
        assert_eq!(card.range, TimeRange::OneDay);
        assert_eq!(card.series.range, TimeRange::OneDay);
        assert!(card.series.points.iter().all(|p| p.price < 20.0));
        assert_eq!(card.bounds.unwrap().max, 13.0);
    }

    #[tokio::test]
    async fn test_view_all_respects_limit_and_maximize() {
        let (_backend, view) = setup(2);
        let added = view.view_all().await.unwrap();
        assert_eq!(added, vec![t("AAPL"), t("MSFT")]);

        assert!(view.select(t("NVDA")).is_err());
        assert_eq!(view.toggle_maximize(&t("MSFT")).unwrap(), Some(t("MSFT")));
        view.select(t("NVDA")).unwrap();

        let snap = view.snapshot(&QuoteQuery::default());
        assert_eq!(snap.selected.len(), 3);
        assert_eq!(snap.graphs.len(), 1);
        assert!(snap.graphs[0].maximized);

        assert!(view.deselect(&t("AAPL")));
        let snap = view.snapshot(&QuoteQuery::default());
        assert_eq!(snap.maximized, None);
        assert!(view.toggle_maximize(&t("AAPL")).is_err());
    }

    #[tokio::test]
    async fn test_unloaded_ticker_cannot_be_selected() {
        let (_backend, view) = setup(6);
        assert!(matches!(view.select(t("AAPL")), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_teardown_discards_pending_history() {
        let (backend, view) = setup(6);
        backend.set_latency("AAPL:1Y", Duration::from_millis(80));
        view.load_wishlist("US Tech").await.unwrap();
        view.select(t("AAPL")).unwrap();
        view.teardown();

        sleep(Duration::from_millis(150)).await;
        let snap = view.snapshot(&QuoteQuery::default());
        assert!(snap.graphs.is_empty());
        assert!(view.select(t("MSFT")).is_err());
    }
}
