use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::routes::{graphs, health, news, portfolio, recommendations, screener, wishlists};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/api/screener", screener::router())
        .nest("/api/graphs", graphs::router())
        .nest("/api/portfolio", portfolio::router())
        .nest("/api/news", news::router())
        .nest("/api/recommendations", recommendations::router())
        .nest("/api/wishlists", wishlists::router())
        .layer(cors)
        .with_state(state)
}
