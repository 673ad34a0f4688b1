use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TickerSet;

/// A single news article from the sentiment feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub related_tickers: TickerSet,
    pub url: String,
    pub image_url: Option<String>,
}

/// Sentiment classification for news
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Maps a provider label such as "Somewhat-Bullish" onto the three classes.
    pub fn from_label(label: &str) -> Self {
        if label.contains("Bullish") {
            Sentiment::Positive
        } else if label.contains("Bearish") {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Neutral => write!(f, "neutral"),
            Sentiment::Negative => write!(f, "negative"),
        }
    }
}

impl std::str::FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(format!("unknown sentiment: {}", other)),
        }
    }
}
