use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Ticker, TimeRange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Price history for one (ticker, range) pair. A new pair always means a new
/// series; points from different pairs are never merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalSeries {
    pub ticker: Ticker,
    pub range: TimeRange,
    pub points: Vec<PricePoint>,
}

impl HistoricalSeries {
    pub fn bounds(&self) -> Option<SeriesBounds> {
        bounds_of(&self.points)
    }
}

/// Price bounds used to scale a chart axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesBounds {
    pub min: f64,
    pub max: f64,
}

pub fn bounds_of(points: &[PricePoint]) -> Option<SeriesBounds> {
    let mut iter = points.iter().map(|p| p.price).filter(|p| p.is_finite());
    let first = iter.next()?;
    let (min, max) = iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
    Some(SeriesBounds { min, max })
}
