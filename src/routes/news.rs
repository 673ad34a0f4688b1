use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Sentiment, TickerSet};
use crate::routes::{find, unmount, Mounted};
use crate::services::SortOrder;
use crate::state::AppState;
use crate::views::news::{NewsQuery, NewsSnapshot, NewsSort};
use crate::views::NewsView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(mount_news))
        .route("/:id", get(get_news).delete(unmount_news))
        .route("/:id/refresh", post(refresh))
}

#[derive(Debug, Default, Deserialize)]
struct NewsParams {
    #[serde(default)]
    search: String,
    sentiment: Option<Sentiment>,
    sort: Option<NewsSort>,
    order: Option<SortOrder>,
}

impl NewsParams {
    /// Newest first unless the caller asks otherwise.
    fn query(self) -> NewsQuery {
        let (key, order) = match (self.sort, self.order) {
            (Some(key), Some(order)) => (key, order),
            (Some(NewsSort::Published), None) | (None, None) => (NewsSort::Published, SortOrder::Desc),
            (Some(key), None) => (key, SortOrder::Asc),
            (None, Some(order)) => (NewsSort::Published, order),
        };
        let query = NewsQuery::default().search(self.search).sort(key, order);
        match self.sentiment {
            Some(sentiment) => query.filter(sentiment),
            None => query,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MountNews {
    #[serde(default)]
    tickers: Vec<String>,
}

async fn mount_news(
    State(state): State<AppState>,
    Json(body): Json<MountNews>,
) -> Result<Json<Mounted<NewsSnapshot>>, AppError> {
    let tickers = TickerSet::parse(&body.tickers)?;
    info!("POST /news - Mounting news for [{}]", tickers.to_csv());

    let view = NewsView::new(
        state.news_provider.clone(),
        tickers,
        state.config.news_feed_limit,
    );
    view.refresh();

    let (id, view) = state.news.mount(view);
    Ok(Json(Mounted {
        id,
        snapshot: view.snapshot(&NewsParams::default().query()),
    }))
}

async fn get_news(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<NewsParams>,
) -> Result<Json<NewsSnapshot>, AppError> {
    let view = find(&state.news, id)?;
    Ok(Json(view.snapshot(&params.query())))
}

async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NewsSnapshot>, AppError> {
    info!("POST /news/{}/refresh", id);
    let view = find(&state.news, id)?;
    view.refresh();
    Ok(Json(view.snapshot(&NewsParams::default().query())))
}

async fn unmount_news(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /news/{} - Unmounting", id);
    unmount(&state.news, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_is_newest_first() {
        let query = NewsParams::default().query();
        assert_eq!(query.sort, Some((NewsSort::Published, SortOrder::Desc)));
        assert!(query.filter.is_none());
    }

    #[test]
    fn test_explicit_sort_defaults_to_ascending() {
        let params = NewsParams {
            sort: Some(NewsSort::Title),
            sentiment: Some(Sentiment::Negative),
            ..Default::default()
        };
        let query = params.query();
        assert_eq!(query.sort, Some((NewsSort::Title, SortOrder::Asc)));
        assert_eq!(query.filter, Some(Sentiment::Negative));
    }
}
