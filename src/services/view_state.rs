//! Pure view composition: search, filter, sort and selection over fetched rows.
//!
//! Nothing here fetches or mutates shared state. A snapshot is a function of
//! the gate's current state and the caller's query.

use std::borrow::Cow;
use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::external::{FailureKind, FetchError};
use crate::models::Ticker;
use crate::services::fetch_gate::{GateSnapshot, LoadState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// The value a row exposes for one sort key.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue<'a> {
    Text(Cow<'a, str>),
    Number(Option<f64>),
}

/// A row that can be searched, filtered and sorted in a view.
pub trait ViewRow {
    type SortKey: Copy;
    type Filter;

    /// Text fields matched by the search box.
    fn search_fields(&self) -> Vec<Cow<'_, str>>;

    fn sort_value(&self, key: Self::SortKey) -> SortValue<'_>;

    fn matches_filter(&self, filter: &Self::Filter) -> bool;
}

#[derive(Debug, Clone)]
pub struct ViewQuery<S, F> {
    pub search: String,
    pub sort: Option<(S, SortOrder)>,
    pub filter: Option<F>,
}

impl<S, F> Default for ViewQuery<S, F> {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort: None,
            filter: None,
        }
    }
}

impl<S, F> ViewQuery<S, F> {
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn sort(mut self, key: S, order: SortOrder) -> Self {
        self.sort = Some((key, order));
        self
    }

    pub fn filter(mut self, filter: F) -> Self {
        self.filter = Some(filter);
        self
    }
}

pub fn matches_search<R: ViewRow>(row: &R, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    row.search_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Case-insensitive comparison with a byte-order tie-break, so distinct
/// strings never compare equal.
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Missing and NaN values sort last in either direction.
pub fn compare_values(a: &SortValue<'_>, b: &SortValue<'_>, order: SortOrder) -> Ordering {
    match (a, b) {
        (SortValue::Text(x), SortValue::Text(y)) => order.apply(compare_text(x, y)),
        (SortValue::Number(x), SortValue::Number(y)) => {
            let x = x.filter(|v| !v.is_nan());
            let y = y.filter(|v| !v.is_nan());
            match (x, y) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => order.apply(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
            }
        }
        // a key always yields the same variant; mixed pairs keep input order
        _ => Ordering::Equal,
    }
}

/// Searches, filters and stably sorts `rows`.
pub fn render<'a, R: ViewRow>(
    rows: &'a [R],
    query: &ViewQuery<R::SortKey, R::Filter>,
) -> Vec<&'a R> {
    let mut visible: Vec<&R> = rows
        .iter()
        .filter(|row| matches_search(*row, &query.search))
        .filter(|row| query.filter.as_ref().map_or(true, |f| row.matches_filter(f)))
        .collect();

    if let Some((key, order)) = query.sort {
        visible.sort_by(|a, b| compare_values(&a.sort_value(key), &b.sort_value(key), order));
    }
    visible
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    Idle,
    Loading,
    Empty,
    NoMatches,
    Error,
    AuthRequired,
    Ready,
}

impl ViewStatus {
    pub fn message(&self) -> &'static str {
        match self {
            ViewStatus::Idle => "Nothing selected yet",
            ViewStatus::Loading => "Loading data",
            ViewStatus::Empty => "No data available",
            ViewStatus::NoMatches => "No results match your search or filter",
            ViewStatus::Error => "Failed to load data, it will be retried",
            ViewStatus::AuthRequired => "Please log in to your brokerage account",
            ViewStatus::Ready => "Up to date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&FetchError> for ErrorInfo {
    fn from(e: &FetchError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// What a view hands to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot<V> {
    pub status: ViewStatus,
    pub message: &'static str,
    pub error: Option<ErrorInfo>,
    pub refreshing: bool,
    pub updated_at: Option<DateTime<Utc>>,
    /// Rows fetched, before search and filter.
    pub total: usize,
    pub rows: Vec<V>,
}

impl<V> ViewSnapshot<V> {
    pub fn with_status(status: ViewStatus) -> Self {
        Self {
            status,
            message: status.message(),
            error: None,
            refreshing: false,
            updated_at: None,
            total: 0,
            rows: Vec::new(),
        }
    }
}

/// Status of a gated load, ignoring search and filter.
pub fn status_of<T>(state: &LoadState<T>) -> (ViewStatus, Option<ErrorInfo>) {
    match state {
        LoadState::Idle => (ViewStatus::Idle, None),
        LoadState::Loading => (ViewStatus::Loading, None),
        LoadState::Empty => (ViewStatus::Empty, None),
        LoadState::Ready(_) => (ViewStatus::Ready, None),
        LoadState::Failed(e @ FetchError::AuthRequired) => {
            (ViewStatus::AuthRequired, Some(ErrorInfo::from(e)))
        }
        LoadState::Failed(e) => (ViewStatus::Error, Some(ErrorInfo::from(e))),
    }
}

/// Builds a snapshot from a gate's state. Rows are rendered only when the
/// gate is `Ready`; every other state yields an empty row list.
pub fn compose<K, R, V, M>(
    gate: &GateSnapshot<K, R>,
    query: &ViewQuery<R::SortKey, R::Filter>,
    map: M,
) -> ViewSnapshot<V>
where
    R: ViewRow,
    M: Fn(&R) -> V,
{
    let (mut status, error) = status_of(&gate.state);
    let all = gate.state.rows();
    let rows: Vec<V> = render(all, query).into_iter().map(&map).collect();
    if status == ViewStatus::Ready && rows.is_empty() {
        status = ViewStatus::NoMatches;
    }

    ViewSnapshot {
        status,
        message: status.message(),
        error,
        refreshing: gate.refreshing,
        updated_at: gate.updated_at,
        total: all.len(),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("{0} is already selected")]
    AlreadySelected(Ticker),
    #[error("at most {0} graphs can be shown at once")]
    LimitReached(usize),
}

/// The multi-graph selection: up to `limit` graphs, or a single maximized one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSelection {
    limit: usize,
    selected: Vec<Ticker>,
    maximized: Option<Ticker>,
}

impl GraphSelection {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            selected: Vec::new(),
            maximized: None,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn selected(&self) -> &[Ticker] {
        &self.selected
    }

    pub fn maximized(&self) -> Option<&Ticker> {
        self.maximized.as_ref()
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.selected.contains(ticker)
    }

    /// Adding is allowed past the limit only while a graph is maximized.
    pub fn add(&mut self, ticker: Ticker) -> Result<(), SelectionError> {
        if self.contains(&ticker) {
            return Err(SelectionError::AlreadySelected(ticker));
        }
        if self.selected.len() >= self.limit && self.maximized.is_none() {
            return Err(SelectionError::LimitReached(self.limit));
        }
        self.selected.push(ticker);
        Ok(())
    }

    /// Removing any graph also clears the maximized state.
    pub fn remove(&mut self, ticker: &Ticker) -> bool {
        let before = self.selected.len();
        self.selected.retain(|t| t != ticker);
        let removed = before != self.selected.len();
        if removed {
            self.maximized = None;
        }
        removed
    }

    /// Maximizes `ticker`, or restores the grid when it already is.
    /// Returns false for a ticker that is not selected.
    pub fn toggle_maximize(&mut self, ticker: &Ticker) -> bool {
        if !self.contains(ticker) {
            return false;
        }
        if self.maximized.as_ref() == Some(ticker) {
            self.maximized = None;
        } else {
            self.maximized = Some(ticker.clone());
        }
        true
    }

    /// Graphs currently on screen.
    pub fn visible(&self) -> Vec<&Ticker> {
        match &self.maximized {
            Some(m) => vec![m],
            None => self.selected.iter().take(self.limit).collect(),
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.maximized = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: &'static str,
        value: Option<f64>,
        tag: u8,
    }

    #[derive(Debug, Clone, Copy)]
    enum Key {
        Name,
        Value,
    }

    impl ViewRow for Row {
        type SortKey = Key;
        type Filter = u8;

        fn search_fields(&self) -> Vec<Cow<'_, str>> {
            vec![Cow::Borrowed(self.name)]
        }

        fn sort_value(&self, key: Key) -> SortValue<'_> {
            match key {
                Key::Name => SortValue::Text(Cow::Borrowed(self.name)),
                Key::Value => SortValue::Number(self.value),
            }
        }

        fn matches_filter(&self, filter: &u8) -> bool {
            self.tag == *filter
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "beta", value: Some(2.0), tag: 1 },
            Row { name: "Alpha", value: None, tag: 2 },
            Row { name: "gamma", value: Some(1.0), tag: 1 },
            Row { name: "delta", value: Some(f64::NAN), tag: 2 },
        ]
    }

    fn names(rows: Vec<&Row>) -> Vec<&'static str> {
        rows.into_iter().map(|r| r.name).collect()
    }

    #[test]
    fn test_missing_numbers_sort_last_both_directions() {
        let data = rows();
        let asc = render(&data, &ViewQuery::default().sort(Key::Value, SortOrder::Asc));
        assert_eq!(names(asc), vec!["gamma", "beta", "Alpha", "delta"]);

        let desc = render(&data, &ViewQuery::default().sort(Key::Value, SortOrder::Desc));
        assert_eq!(names(desc), vec!["beta", "gamma", "Alpha", "delta"]);
    }

    #[test]
    fn test_text_sort_ignores_case() {
        let data = rows();
        let sorted = render(&data, &ViewQuery::default().sort(Key::Name, SortOrder::Asc));
        assert_eq!(names(sorted), vec!["Alpha", "beta", "delta", "gamma"]);
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let data = rows();
        let found = render(&data, &ViewQuery::default().search("ALP"));
        assert_eq!(names(found), vec!["Alpha"]);
    }

    #[test]
    fn test_empty_query_returns_everything_in_order() {
        let data = rows();
        let all = render(&data, &ViewQuery::default().search("   "));
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].name, "beta");
    }

    #[test]
    fn test_filter_combines_with_search() {
        let data = rows();
        let q = ViewQuery::default().filter(1).search("a");
        assert_eq!(names(render(&data, &q)), vec!["beta", "gamma"]);
    }

    #[test]
    fn test_compose_reports_no_matches_not_error() {
        let gate = GateSnapshot {
            key: Some(()),
            state: LoadState::Ready(rows()),
            refreshing: false,
            generation: 1,
            updated_at: None,
            closed: false,
        };
        let snap = compose(&gate, &ViewQuery::default().search("zzz"), |r: &Row| r.name);
        assert_eq!(snap.status, ViewStatus::NoMatches);
        assert!(snap.rows.is_empty());
        assert!(snap.error.is_none());
        assert_eq!(snap.total, 4);
    }

    #[test]
    fn test_compose_maps_auth_failure() {
        let gate: GateSnapshot<(), Row> = GateSnapshot {
            key: Some(()),
            state: LoadState::Failed(FetchError::AuthRequired),
            refreshing: false,
            generation: 1,
            updated_at: None,
            closed: false,
        };
        let snap = compose(&gate, &ViewQuery::default(), |r: &Row| r.name);
        assert_eq!(snap.status, ViewStatus::AuthRequired);
        assert_eq!(snap.error.unwrap().kind, FailureKind::AuthRequired);
    }

    #[test]
    fn test_status_messages_are_distinct() {
        let all = [
            ViewStatus::Idle,
            ViewStatus::Loading,
            ViewStatus::Empty,
            ViewStatus::NoMatches,
            ViewStatus::Error,
            ViewStatus::AuthRequired,
            ViewStatus::Ready,
        ];
        let mut messages: Vec<_> = all.iter().map(|s| s.message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), all.len());
    }

    fn t(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    #[test]
    fn test_selection_limit_and_maximize() {
        let mut sel = GraphSelection::new(2);
        sel.add(t("A")).unwrap();
        sel.add(t("B")).unwrap();
        assert_eq!(sel.add(t("C")), Err(SelectionError::LimitReached(2)));
        assert_eq!(sel.add(t("A")), Err(SelectionError::AlreadySelected(t("A"))));

        assert!(sel.toggle_maximize(&t("B")));
        assert_eq!(sel.visible(), vec![&t("B")]);

        // adding while maximized is allowed
        sel.add(t("C")).unwrap();
        assert_eq!(sel.selected().len(), 3);

        assert!(sel.remove(&t("A")));
        assert!(sel.maximized().is_none());
        assert_eq!(sel.visible().len(), 2);
    }

    #[test]
    fn test_toggle_maximize_twice_restores_grid() {
        let mut sel = GraphSelection::new(6);
        sel.add(t("A")).unwrap();
        sel.add(t("B")).unwrap();
        sel.toggle_maximize(&t("A"));
        sel.toggle_maximize(&t("A"));
        assert!(sel.maximized().is_none());
        assert!(!sel.toggle_maximize(&t("Z")));
    }
}
