//! Derived market metrics.
//!
//! Every value here is computed from its inputs on demand. Nothing is cached,
//! so a refreshed price can never leave a stale percentage behind. Divisions
//! by zero and non-finite inputs produce `None` instead of NaN or infinity.

use serde::Serialize;

use crate::models::{Holding, Quote};

/// Finite result or `None`.
fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// `numerator / denominator * 100`, or `None` when the denominator is zero.
pub fn percent_of(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return None;
    }
    finite(numerator / denominator * 100.0)
}

/// How far the price sits below its 52-week high, in percent.
pub fn percent_from_high(week_high_52: f64, current_price: f64) -> Option<f64> {
    percent_of(week_high_52 - current_price, week_high_52)
}

/// How far the price sits above its 52-week low, in percent.
pub fn percent_from_low(week_low_52: f64, current_price: f64) -> Option<f64> {
    percent_of(current_price - week_low_52, week_low_52)
}

pub fn invested_value(quantity: f64, avg_price: f64) -> f64 {
    avg_price * quantity
}

pub fn current_value(quantity: f64, current_price: f64) -> f64 {
    current_price * quantity
}

pub fn profit_and_loss(current_value: f64, invested_value: f64) -> f64 {
    current_value - invested_value
}

pub fn profit_and_loss_pct(current_value: f64, invested_value: f64) -> Option<f64> {
    percent_of(profit_and_loss(current_value, invested_value), invested_value)
}

/// Mean of the values that are present and finite. `None` when there are none.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        finite(sum / count as f64)
    }
}

/// Headline indicators shown above the screener list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketIndicators {
    pub avg_pe: Option<f64>,
    pub avg_percent_from_high: Option<f64>,
    pub stocks_up: usize,
    pub total: usize,
    pub percent_up: Option<f64>,
    pub avg_change_pct: Option<f64>,
}

/// Aggregates over the rows currently visible. Missing P/E values are skipped
/// rather than counted as zero.
pub fn market_indicators(quotes: &[Quote]) -> MarketIndicators {
    let total = quotes.len();
    let stocks_up = quotes.iter().filter(|q| q.change_abs > 0.0).count();

    MarketIndicators {
        avg_pe: mean(quotes.iter().map(|q| q.pe)),
        avg_percent_from_high: mean(quotes.iter().map(Quote::percent_from_high)),
        stocks_up,
        total,
        percent_up: percent_of(stocks_up as f64, total as f64),
        avg_change_pct: mean(quotes.iter().map(|q| Some(q.change_pct))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioTotals {
    pub total_invested: f64,
    pub current_value: f64,
    pub total_pl: f64,
    pub total_pl_pct: Option<f64>,
    pub is_profit: bool,
}

pub fn portfolio_totals(holdings: &[Holding]) -> PortfolioTotals {
    let total_invested: f64 = holdings.iter().map(Holding::invested_value).sum();
    let current_value: f64 = holdings.iter().map(Holding::current_value).sum();
    let total_pl = profit_and_loss(current_value, total_invested);

    PortfolioTotals {
        total_invested,
        current_value,
        total_pl,
        total_pl_pct: percent_of(total_pl, total_invested),
        is_profit: total_pl >= 0.0,
    }
}
