use std::borrow::Cow;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::external::{FetchError, NewsProvider};
use crate::models::{NewsItem, Sentiment, TickerSet};
use crate::services::{compose, FetchGate, SortValue, ViewQuery, ViewRow, ViewSnapshot};
use crate::views::View;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsSort {
    #[default]
    Published,
    Title,
    Source,
}

impl ViewRow for NewsItem {
    type SortKey = NewsSort;
    type Filter = Sentiment;

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(&self.title),
            Cow::Borrowed(&self.excerpt),
            Cow::Owned(self.related_tickers.to_csv()),
        ]
    }

    fn sort_value(&self, key: NewsSort) -> SortValue<'_> {
        match key {
            NewsSort::Published => {
                SortValue::Number(Some(self.published_at.timestamp_millis() as f64))
            }
            NewsSort::Title => SortValue::Text(Cow::Borrowed(&self.title)),
            NewsSort::Source => SortValue::Text(Cow::Borrowed(&self.source)),
        }
    }

    fn matches_filter(&self, filter: &Sentiment) -> bool {
        self.sentiment == *filter
    }
}

pub type NewsQuery = ViewQuery<NewsSort, Sentiment>;

#[derive(Debug, Clone, Serialize)]
pub struct NewsSnapshot {
    #[serde(flatten)]
    pub view: ViewSnapshot<NewsItem>,
    pub tickers: TickerSet,
}

/// Keeps the `limit` most recent articles, newest first.
pub fn newest(mut items: Vec<NewsItem>, limit: usize) -> Vec<NewsItem> {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.truncate(limit);
    items
}

/// Sentiment-tagged headlines for a ticker set. Fetched on mount and on
/// explicit refresh only.
pub struct NewsView {
    provider: Option<Arc<dyn NewsProvider>>,
    tickers: TickerSet,
    limit: usize,
    gate: FetchGate<TickerSet, NewsItem>,
    torn_down: Mutex<bool>,
}

impl NewsView {
    /// `provider` is `None` when no news API key is configured; the view then
    /// reports a configuration error instead of fetching.
    pub fn new(provider: Option<Arc<dyn NewsProvider>>, tickers: TickerSet, limit: usize) -> Self {
        Self {
            provider,
            tickers,
            limit,
            gate: FetchGate::new("news"),
            torn_down: Mutex::new(false),
        }
    }

    /// Starts a background fetch, superseding any that is still running.
    pub fn refresh(&self) {
        if *self.torn_down.lock() {
            return;
        }
        let tickers = self.tickers.clone();
        let limit = self.limit;

        match &self.provider {
            Some(provider) => {
                info!("Refreshing news for [{}]", tickers.to_csv());
                let provider = Arc::clone(provider);
                let key = tickers.clone();
                self.gate.spawn(key, async move {
                    provider
                        .fetch_news(&tickers)
                        .await
                        .map(|items| newest(items, limit))
                });
            }
            None => {
                let ticket = self.gate.begin(tickers);
                self.gate.commit(
                    ticket,
                    Err(FetchError::NotConfigured("NEWS_API_KEY is not set".to_string())),
                );
            }
        }
    }

    pub fn snapshot(&self, query: &NewsQuery) -> NewsSnapshot {
        let gate = self.gate.snapshot();
        NewsSnapshot {
            view: compose(&gate, query, NewsItem::clone),
            tickers: self.tickers.clone(),
        }
    }
}

impl View for NewsView {
    fn teardown(&self) {
        *self.torn_down.lock() = true;
        self.gate.close();
    }
}
