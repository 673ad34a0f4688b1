use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::models::{RecommendationFilter, RecommendationView};
use crate::services::{SortOrder, ViewSnapshot};
use crate::state::AppState;
use crate::views::recommendations::{RecommendationQuery, RecommendationSort};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_recommendations))
        .route("/:id/notifications", post(toggle_notifications))
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationParams {
    #[serde(default)]
    search: String,
    filter: Option<RecommendationFilter>,
    sort: Option<RecommendationSort>,
    order: Option<SortOrder>,
}

async fn list_recommendations(
    State(state): State<AppState>,
    Query(params): Query<RecommendationParams>,
) -> Json<ViewSnapshot<RecommendationView>> {
    info!("GET /recommendations - filter {:?}", params.filter);
    let mut query = RecommendationQuery::default().search(params.search);
    if let Some(filter) = params.filter {
        query = query.filter(filter);
    }
    if let Some(key) = params.sort {
        query = query.sort(key, params.order.unwrap_or_default());
    }
    Json(state.recommendations.snapshot(&query))
}

async fn toggle_notifications(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecommendationView>, AppError> {
    info!("POST /recommendations/{}/notifications", id);
    state
        .recommendations
        .toggle_notifications(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("recommendation {}", id)))
}
