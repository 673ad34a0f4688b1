use crate::external::market_backend::{FetchError, NewsProvider};
use crate::models::{NewsItem, Sentiment, Ticker, TickerSet};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

/// Alpha Vantage `NEWS_SENTIMENT` feed.
pub struct AlphaVantageNewsProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl AlphaVantageNewsProvider {
    pub fn new(base_url: Url, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AvNewsResponse {
    feed: Option<Vec<AvFeedItem>>,

    // When rate-limited Alpha Vantage returns:
    // { "Note": "Thank you for using Alpha Vantage! ... 5 calls per minute ..." }
    #[serde(rename = "Note")]
    note: Option<String>,

    // Daily quota exhaustion uses "Information" instead of "Note".
    #[serde(rename = "Information")]
    information: Option<String>,

    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvFeedItem {
    title: String,
    url: String,
    time_published: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    banner_image: Option<String>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    overall_sentiment_label: String,
    #[serde(default)]
    ticker_sentiment: Vec<AvTickerSentiment>,
}

#[derive(Debug, Deserialize)]
struct AvTickerSentiment {
    ticker: String,
}

/// Parses the feed's compact `YYYYMMDDTHHMMSS` timestamp as UTC.
pub fn parse_compact_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M"))
        .ok()
        .map(|dt| dt.and_utc())
}

fn into_news_item(index: usize, item: AvFeedItem) -> Option<NewsItem> {
    let published_at = match parse_compact_timestamp(&item.time_published) {
        Some(ts) => ts,
        None => {
            warn!("Dropping article with unparseable timestamp {:?}", item.time_published);
            return None;
        }
    };

    let related_tickers: TickerSet = item
        .ticker_sentiment
        .iter()
        .filter_map(|t| Ticker::parse(&t.ticker).ok())
        .collect();

    let id = if item.url.is_empty() {
        (index + 1).to_string()
    } else {
        item.url.clone()
    };

    Some(NewsItem {
        id,
        title: item.title,
        excerpt: item.summary,
        source: item.source,
        published_at,
        sentiment: Sentiment::from_label(&item.overall_sentiment_label),
        related_tickers,
        url: item.url,
        image_url: item.banner_image.filter(|u| !u.is_empty()),
    })
}

#[async_trait]
impl NewsProvider for AlphaVantageNewsProvider {
    async fn fetch_news(&self, tickers: &TickerSet) -> Result<Vec<NewsItem>, FetchError> {
        let tickers_csv = tickers.to_csv();
        let mut query = vec![("function", "NEWS_SENTIMENT"), ("apikey", self.api_key.as_str())];
        if !tickers.is_empty() {
            query.push(("tickers", tickers_csv.as_str()));
        }

        let resp = self
            .client
            .get(self.base_url.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FetchError::Network(format!("news feed returned {}", resp.status())));
        }

        let body = resp
            .json::<AvNewsResponse>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        if body.note.is_some() || body.information.is_some() {
            // This is the throttle response
            return Err(FetchError::RateLimited);
        }

        if let Some(msg) = body.error_message {
            return Err(FetchError::Malformed(msg));
        }

        let items: Vec<NewsItem> = body
            .feed
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| into_news_item(i, item))
            .collect();

        info!("Fetched {} news articles for [{}]", items.len(), tickers_csv);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_compact_timestamp_normalizes_to_utc() {
        let ts = parse_compact_timestamp("20250310T143005").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 5).unwrap());
        assert_eq!(ts.to_rfc3339(), "2025-03-10T14:30:05+00:00");
    }

    #[test]
    fn test_compact_timestamp_rejects_garbage() {
        assert!(parse_compact_timestamp("2025-03-10").is_none());
        assert!(parse_compact_timestamp("").is_none());
    }

    #[test]
    fn test_feed_item_mapping() {
        let body: AvNewsResponse = serde_json::from_value(serde_json::json!({
            "feed": [{
                "title": "Chipmaker beats estimates",
                "url": "https://example.com/a",
                "time_published": "20250310T090000",
                "summary": "Strong quarter.",
                "banner_image": "",
                "source": "Wire",
                "overall_sentiment_label": "Somewhat-Bullish",
                "ticker_sentiment": [{"ticker": "NVDA"}, {"ticker": "AAPL"}]
            }]
        }))
        .unwrap();
        let item = body.feed.unwrap().into_iter().next().unwrap();
        let news = into_news_item(0, item).unwrap();
        assert_eq!(news.sentiment, Sentiment::Positive);
        assert_eq!(news.related_tickers.to_csv(), "NVDA,AAPL");
        assert_eq!(news.image_url, None);
        assert_eq!(news.id, "https://example.com/a");
    }

    #[test]
    fn test_throttle_note_is_detected() {
        let body: AvNewsResponse =
            serde_json::from_str(r#"{"Note": "Thank you for using Alpha Vantage!"}"#).unwrap();
        assert!(body.note.is_some());
        assert!(body.feed.is_none());
    }
}
