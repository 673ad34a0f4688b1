use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use http::header::COOKIE;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};
use url::Url;

use crate::external::market_backend::{
    AuthStatus, BrokerCredentials, BrokerSession, FetchError, MarketBackend,
};
use crate::models::{Holding, PricePoint, Quote, Ticker, TickerSet, TimeRange, Wishlist};

/// HTTP client for the dashboard backend.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// `base_url` must end with a slash so relative endpoints join under it.
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::Network(format!("invalid endpoint {}: {}", path, e)))
    }

    /// `path` followed by `segment`, percent-encoded as one path segment.
    fn endpoint_with_segment(&self, path: &str, segment: &str) -> Result<Url, FetchError> {
        if matches!(segment, "" | "." | "..") {
            return Err(FetchError::Malformed(format!("invalid path segment {:?}", segment)));
        }
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Network(format!("endpoint {} cannot take a path segment", path)))?
            .push(segment);
        Ok(url)
    }

    fn with_session(request: RequestBuilder, session: &BrokerSession) -> RequestBuilder {
        match &session.cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }

    async fn send_raw(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response, FetchError> {
        request.send().await.map_err(|e| {
            error!("Backend request for {} failed: {}", what, e);
            FetchError::Network(e.to_string())
        })
    }

    async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response, FetchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::AuthRequired),
            StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
            _ => {
                let body = response.text().await.unwrap_or_default();
                error!("Backend returned {} for {}: {}", status, what, body);
                Err(FetchError::Network(format!("{} returned {}", what, status)))
            }
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response, FetchError> {
        let response = self.send_raw(request, what).await?;
        Self::check_status(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, FetchError> {
        let response = self.send(request, what).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Malformed(format!("{}: {}", what, e)))
    }
}

// ==============================================================================
// Wire records
// ==============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRecord {
    #[serde(alias = "ticker")]
    symbol: Option<String>,
    name: Option<String>,
    current_price: Option<f64>,
    #[serde(alias = "changeAbs")]
    change: Option<f64>,
    #[serde(alias = "changePct")]
    change_percentage: Option<f64>,
    week_high52: Option<f64>,
    week_low52: Option<f64>,
    pe: Option<f64>,
    sector: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct HoldingRecord {
    #[serde(alias = "tradingsymbol", alias = "ticker")]
    symbol: Option<String>,
    name: Option<String>,
    quantity: Option<f64>,
    #[serde(alias = "avgPrice", alias = "average_price")]
    avg_price: Option<f64>,
    #[serde(alias = "currentPrice", alias = "last_price")]
    current_price: Option<f64>,
    #[serde(alias = "dayChangePct", alias = "dayChange", alias = "day_change_percentage")]
    day_change_pct: Option<f64>,
    sector: Option<String>,
    pe: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HoldingsEnvelope {
    Wrapped { data: Vec<Value> },
    Bare(Vec<Value>),
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(rename = "chartData", alias = "points", default)]
    chart_data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PointRecord {
    date: String,
    price: f64,
}

#[derive(Debug, Deserialize)]
struct WishlistRecord {
    id: Value,
    name: String,
    #[serde(default)]
    symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WishlistBody<'a> {
    id: &'a str,
    name: &'a str,
    symbols: &'a TickerSet,
}

#[derive(Debug, Deserialize)]
struct LogoutResponse {
    error: Option<String>,
}

fn required(value: Option<f64>, field: &str) -> Result<f64, String> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(format!("{} is not a finite number", field)),
        None => Err(format!("missing {}", field)),
    }
}

fn optional(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl QuoteRecord {
    fn validate(self) -> Result<Quote, String> {
        let symbol = self.symbol.ok_or("missing symbol")?;
        let ticker = Ticker::parse(&symbol).map_err(|e| e.to_string())?;
        Ok(Quote {
            name: self.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| ticker.to_string()),
            current_price: required(self.current_price, "currentPrice")?,
            change_abs: required(self.change, "change")?,
            change_pct: required(self.change_percentage, "changePercentage")?,
            week_high_52: required(self.week_high52, "weekHigh52")?,
            week_low_52: required(self.week_low52, "weekLow52")?,
            pe: optional(self.pe),
            sector: self.sector.unwrap_or_else(|| "Unknown".to_string()),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            ticker,
        })
    }
}

impl HoldingRecord {
    fn validate(self) -> Result<Holding, String> {
        let symbol = self.symbol.ok_or("missing symbol")?;
        let ticker = Ticker::parse(&symbol).map_err(|e| e.to_string())?;
        let quantity = required(self.quantity, "quantity")?;
        if quantity < 0.0 {
            return Err(format!("negative quantity {}", quantity));
        }
        Ok(Holding {
            name: self.name.unwrap_or_else(|| ticker.to_string()),
            quantity,
            avg_price: required(self.avg_price, "avgPrice")?,
            current_price: required(self.current_price, "currentPrice")?,
            day_change_pct: optional(self.day_change_pct).unwrap_or(0.0),
            sector: self.sector.unwrap_or_else(|| "Unknown".to_string()),
            pe: optional(self.pe),
            ticker,
        })
    }
}

impl PointRecord {
    fn validate(self) -> Result<PricePoint, String> {
        let day = self.date.get(..10).unwrap_or(&self.date);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|e| format!("bad date {:?}: {}", self.date, e))?;
        let price = required(Some(self.price), "price")?;
        Ok(PricePoint { date, price })
    }
}

impl WishlistRecord {
    fn validate(self) -> Result<Wishlist, String> {
        let id = match self.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => return Err(format!("unsupported wishlist id {}", other)),
        };
        let mut symbols = TickerSet::new();
        for raw in &self.symbols {
            match Ticker::parse(raw) {
                Ok(t) => {
                    symbols.insert(t);
                }
                Err(e) => warn!("Skipping symbol {:?} in wishlist {}: {}", raw, self.name, e),
            }
        }
        Ok(Wishlist { id, name: self.name, symbols })
    }
}

/// Validates each record on its own. Bad records are dropped and logged; a
/// payload where every record is bad is reported as malformed.
pub(crate) fn decode_records<R, T, F>(values: Vec<Value>, what: &str, validate: F) -> Result<Vec<T>, FetchError>
where
    R: DeserializeOwned,
    F: Fn(R) -> Result<T, String>,
{
    let total = values.len();
    let mut out = Vec::with_capacity(total);
    let mut rejected = 0usize;

    for value in values {
        let record = serde_json::from_value::<R>(value)
            .map_err(|e| e.to_string())
            .and_then(&validate);
        match record {
            Ok(item) => out.push(item),
            Err(reason) => {
                rejected += 1;
                warn!("Rejected malformed {} record: {}", what, reason);
            }
        }
    }

    if total > 0 && out.is_empty() {
        return Err(FetchError::Malformed(format!("all {} {} records were invalid", total, what)));
    }
    if rejected > 0 {
        debug!("Kept {}/{} {} records", out.len(), total, what);
    }
    Ok(out)
}

#[async_trait]
impl MarketBackend for BackendClient {
    async fn fetch_quotes(&self, tickers: &TickerSet) -> Result<Vec<Quote>, FetchError> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.endpoint("stocks")?;
        let request = self.client.get(url).query(&[("tickers", tickers.to_csv())]);
        let values: Vec<Value> = self.get_json(request, "stocks").await?;
        decode_records(values, "quote", QuoteRecord::validate)
    }

    async fn fetch_quote(&self, ticker: &Ticker) -> Result<Option<Quote>, FetchError> {
        let url = self.endpoint("stock")?;
        let request = self.client.get(url).query(&[("ticker", ticker.as_str())]);
        let response = self.send_raw(request, "stock").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = Self::check_status(response, "stock")
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("stock: {}", e)))?;

        match value {
            Value::Null => Ok(None),
            Value::Object(ref map) if map.is_empty() => Ok(None),
            Value::Array(values) => Ok(decode_records(values, "quote", QuoteRecord::validate)?
                .into_iter()
                .next()),
            other => {
                let record: QuoteRecord = serde_json::from_value(other)
                    .map_err(|e| FetchError::Malformed(e.to_string()))?;
                record.validate().map(Some).map_err(FetchError::Malformed)
            }
        }
    }

    async fn fetch_history(&self, ticker: &Ticker, range: TimeRange) -> Result<Vec<PricePoint>, FetchError> {
        let url = self.endpoint("stock_hist")?;
        let request = self
            .client
            .get(url)
            .query(&[("ticker", ticker.as_str()), ("time", range.as_str())]);
        let body: HistoryResponse = self.get_json(request, "stock_hist").await?;
        let mut points = decode_records(body.chart_data, "price point", PointRecord::validate)?;
        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    async fn list_wishlists(&self) -> Result<Vec<Wishlist>, FetchError> {
        let url = self.endpoint("wishlists")?;
        let values: Vec<Value> = self.get_json(self.client.get(url), "wishlists").await?;
        decode_records(values, "wishlist", WishlistRecord::validate)
    }

    async fn create_wishlist(&self, wishlist: &Wishlist) -> Result<Wishlist, FetchError> {
        let url = self.endpoint("wishlist")?;
        let body = WishlistBody {
            id: &wishlist.id,
            name: &wishlist.name,
            symbols: &wishlist.symbols,
        };
        let response = self.send(self.client.post(url).json(&body), "create wishlist").await?;
        let text = response.text().await.unwrap_or_default();

        // Some backends answer with a bare acknowledgement instead of the record.
        match serde_json::from_str::<WishlistRecord>(&text) {
            Ok(record) => record.validate().map_err(FetchError::Malformed),
            Err(_) => Ok(wishlist.clone()),
        }
    }

    async fn append_to_wishlist(&self, name: &str, symbols: &TickerSet) -> Result<(), FetchError> {
        let url = self.endpoint("wishlist")?;
        let request = self.client.put(url).query(&[("name", name)]).json(symbols);
        self.send(request, "append wishlist").await?;
        Ok(())
    }

    async fn delete_wishlist(&self, id: &str) -> Result<(), FetchError> {
        let url = self.endpoint_with_segment("wishlist", id)?;
        self.send(self.client.delete(url), "delete wishlist").await?;
        Ok(())
    }

    async fn fetch_holdings(&self, session: &BrokerSession) -> Result<Vec<Holding>, FetchError> {
        let url = self.endpoint("holdings")?;
        let request = Self::with_session(self.client.get(url), session);
        let envelope: HoldingsEnvelope = self.get_json(request, "holdings").await?;
        let values = match envelope {
            HoldingsEnvelope::Wrapped { data } => data,
            HoldingsEnvelope::Bare(values) => values,
        };
        decode_records(values, "holding", HoldingRecord::validate)
    }

    async fn auth_check(&self, session: &BrokerSession) -> Result<AuthStatus, FetchError> {
        let url = self.endpoint("auth-check")?;
        let request = Self::with_session(self.client.get(url), session);
        match self.get_json::<AuthStatus>(request, "auth-check").await {
            Err(FetchError::AuthRequired) => Ok(AuthStatus {
                authenticated: false,
                error: Some("session rejected by backend".to_string()),
            }),
            other => other,
        }
    }

    async fn logout(&self, session: &BrokerSession) -> Result<(), FetchError> {
        let url = self.endpoint("logout")?;
        let request = Self::with_session(self.client.post(url), session);
        let response: LogoutResponse = self.get_json(request, "logout").await?;
        match response.error {
            Some(msg) => Err(FetchError::Network(format!("logout failed: {}", msg))),
            None => Ok(()),
        }
    }

    async fn store_api_credentials(&self, credentials: &BrokerCredentials) -> Result<(), FetchError> {
        let url = self.endpoint("store-api-creds")?;
        self.send(self.client.post(url).json(credentials), "store-api-creds").await?;
        Ok(())
    }
}
