use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    news_configured: bool,
    mounted_views: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    info!("GET /health - Health check");
    Json(Health {
        status: "OK",
        news_configured: state.news_provider.is_some(),
        mounted_views: state.screeners.len()
            + state.graphs.len()
            + state.portfolios.len()
            + state.news.len(),
    })
}
