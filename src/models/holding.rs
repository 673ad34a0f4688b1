use serde::{Deserialize, Serialize};

use crate::models::Ticker;
use crate::services::derived_metrics;

/// One brokerage position.
///
/// Invested value, current value and P&L are methods rather than fields: a
/// refreshed `current_price` or `quantity` is reflected immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: Ticker,
    pub name: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub current_price: f64,
    pub day_change_pct: f64,
    pub sector: String,
    pub pe: Option<f64>,
}

impl Holding {
    pub fn invested_value(&self) -> f64 {
        derived_metrics::invested_value(self.quantity, self.avg_price)
    }

    pub fn current_value(&self) -> f64 {
        derived_metrics::current_value(self.quantity, self.current_price)
    }

    pub fn pl(&self) -> f64 {
        derived_metrics::profit_and_loss(self.current_value(), self.invested_value())
    }

    pub fn pl_pct(&self) -> Option<f64> {
        derived_metrics::profit_and_loss_pct(self.current_value(), self.invested_value())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldingView {
    #[serde(flatten)]
    pub holding: Holding,
    pub invested_value: f64,
    pub current_value: f64,
    pub pl: f64,
    pub pl_pct: Option<f64>,
    pub is_profit: bool,
}

impl From<&Holding> for HoldingView {
    fn from(holding: &Holding) -> Self {
        let pl = holding.pl();
        Self {
            invested_value: holding.invested_value(),
            current_value: holding.current_value(),
            pl,
            pl_pct: holding.pl_pct(),
            is_profit: pl >= 0.0,
            holding: holding.clone(),
        }
    }
}
