use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::{Recommendation, RecommendationFilter, RecommendationType, RecommendationView};
use crate::services::{render, SortValue, ViewQuery, ViewRow, ViewSnapshot, ViewStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSort {
    Name,
    Upside,
    Change,
}

impl ViewRow for Recommendation {
    type SortKey = RecommendationSort;
    type Filter = RecommendationFilter;

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(self.ticker.as_str()), Cow::Borrowed(&self.name)]
    }

    fn sort_value(&self, key: RecommendationSort) -> SortValue<'_> {
        match key {
            RecommendationSort::Name => SortValue::Text(Cow::Borrowed(&self.name)),
            RecommendationSort::Upside => SortValue::Number(self.upside_pct()),
            RecommendationSort::Change => SortValue::Number(Some(self.change_pct)),
        }
    }

    fn matches_filter(&self, filter: &RecommendationFilter) -> bool {
        match filter {
            RecommendationFilter::Buy => self.recommendation == RecommendationType::Buy,
            RecommendationFilter::Sell => self.recommendation == RecommendationType::Sell,
            RecommendationFilter::Hold => self.recommendation == RecommendationType::Hold,
            RecommendationFilter::Notifications => self.notifications_enabled,
        }
    }
}

pub type RecommendationQuery = ViewQuery<RecommendationSort, RecommendationFilter>;

#[derive(Debug, Error)]
pub enum BookError {
    #[error("failed to read recommendations file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid recommendations file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Analyst calls shown on the recommendations panel. Lives in memory only;
/// the notification flags reset on restart.
#[derive(Clone, Default)]
pub struct RecommendationBook {
    entries: Arc<RwLock<Vec<Recommendation>>>,
}

impl RecommendationBook {
    pub fn new(entries: Vec<Recommendation>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Seeds the book from a JSON array of recommendations.
    pub fn from_file(path: &Path) -> Result<Self, BookError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<Recommendation> = serde_json::from_str(&raw)?;
        info!("Loaded {} recommendations from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Flips the notification flag. `None` for an unknown id.
    pub fn toggle_notifications(&self, id: &str) -> Option<RecommendationView> {
        let mut entries = self.entries.write();
        let rec = entries.iter_mut().find(|r| r.id == id)?;
        rec.notifications_enabled = !rec.notifications_enabled;
        info!(
            "Notifications for {} {}",
            rec.ticker,
            if rec.notifications_enabled { "enabled" } else { "disabled" }
        );
        Some(RecommendationView::from(&*rec))
    }

    pub fn snapshot(&self, query: &RecommendationQuery) -> ViewSnapshot<RecommendationView> {
        let entries = self.entries.read();
        if entries.is_empty() {
            return ViewSnapshot::with_status(ViewStatus::Empty);
        }

        let rows: Vec<RecommendationView> = render(&entries, query)
            .into_iter()
            .map(RecommendationView::from)
            .collect();
        let status = if rows.is_empty() {
            ViewStatus::NoMatches
        } else {
            ViewStatus::Ready
        };

        ViewSnapshot {
            total: entries.len(),
            rows,
            ..ViewSnapshot::with_status(status)
        }
    }
}
