use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Ticker;
use crate::services::derived_metrics;

/// Latest price snapshot for a ticker.
///
/// Only fetched fields live here. The 52-week distances are derived on every
/// call so they always agree with `current_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: Ticker,
    pub name: String,
    pub current_price: f64,
    pub change_abs: f64,
    pub change_pct: f64,
    pub week_high_52: f64,
    pub week_low_52: f64,
    pub pe: Option<f64>,
    pub sector: String,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn percent_from_high(&self) -> Option<f64> {
        derived_metrics::percent_from_high(self.week_high_52, self.current_price)
    }

    pub fn percent_from_low(&self) -> Option<f64> {
        derived_metrics::percent_from_low(self.week_low_52, self.current_price)
    }

    pub fn is_up(&self) -> bool {
        self.change_abs > 0.0
    }
}

/// A quote as rendered, with its derived fields filled in at render time.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteView {
    #[serde(flatten)]
    pub quote: Quote,
    pub percent_from_high: Option<f64>,
    pub percent_from_low: Option<f64>,
}

impl From<&Quote> for QuoteView {
    fn from(quote: &Quote) -> Self {
        Self {
            percent_from_high: quote.percent_from_high(),
            percent_from_low: quote.percent_from_low(),
            quote: quote.clone(),
        }
    }
}
