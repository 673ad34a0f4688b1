use serde::{Deserialize, Serialize};

use crate::models::Ticker;
use crate::services::derived_metrics;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationType {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendationType::Buy => write!(f, "buy"),
            RecommendationType::Sell => write!(f, "sell"),
            RecommendationType::Hold => write!(f, "hold"),
        }
    }
}

/// An analyst call on a ticker with a price target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub ticker: Ticker,
    pub name: String,
    pub current_price: f64,
    pub target_price: f64,
    pub change_abs: f64,
    pub change_pct: f64,
    pub recommendation: RecommendationType,
    pub analysis: String,
    pub opportunity: String,
    #[serde(default)]
    pub notifications_enabled: bool,
}

impl Recommendation {
    /// Distance to the target price, in percent of the current price.
    pub fn upside_pct(&self) -> Option<f64> {
        derived_metrics::percent_of(self.target_price - self.current_price, self.current_price)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationView {
    #[serde(flatten)]
    pub recommendation: Recommendation,
    pub upside_pct: Option<f64>,
}

impl From<&Recommendation> for RecommendationView {
    fn from(rec: &Recommendation) -> Self {
        Self {
            upside_pct: rec.upside_pct(),
            recommendation: rec.clone(),
        }
    }
}

/// Categorical filter of the recommendations panel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationFilter {
    Buy,
    Sell,
    Hold,
    Notifications,
}
