use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Ticker, TimeRange};
use crate::routes::screener::ScreenerParams;
use crate::routes::{find, unmount, Mounted};
use crate::state::AppState;
use crate::views::multi_graph::MultiGraphSnapshot;
use crate::views::MultiGraphView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(mount_graphs))
        .route("/:id", get(get_graphs).delete(unmount_graphs))
        .route("/:id/wishlist", post(load_wishlist))
        .route("/:id/all", post(view_all))
        .route("/:id/selection/:ticker", post(select).delete(deselect))
        .route("/:id/maximize/:ticker", post(toggle_maximize))
        .route("/:id/range/:ticker", put(set_range))
}

#[derive(Debug, Default, Deserialize)]
struct MountGraphs {
    wishlist: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WishlistName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RangeBody {
    range: TimeRange,
}

#[derive(Debug, Serialize)]
struct Maximized {
    maximized: Option<Ticker>,
}

async fn mount_graphs(
    State(state): State<AppState>,
    Json(body): Json<MountGraphs>,
) -> Result<Json<Mounted<MultiGraphSnapshot>>, AppError> {
    info!("POST /graphs - Mounting multi graph (limit {})", state.config.max_graphs);
    let view = MultiGraphView::new(
        state.backend.clone(),
        state.wishlists.clone(),
        state.config.max_graphs,
    );
    if let Some(name) = body.wishlist {
        view.load_wishlist(&name).await.map_err(|e| {
            error!("Failed to load wishlist {:?}: {}", name, e);
            e
        })?;
    }

    let (id, view) = state.graphs.mount(view);
    Ok(Json(Mounted {
        id,
        snapshot: view.snapshot(&ScreenerParams::default().query()),
    }))
}

async fn get_graphs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ScreenerParams>,
) -> Result<Json<MultiGraphSnapshot>, AppError> {
    let view = find(&state.graphs, id)?;
    Ok(Json(view.snapshot(&params.query())))
}

async fn load_wishlist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<WishlistName>,
) -> Result<Json<MultiGraphSnapshot>, AppError> {
    info!("POST /graphs/{}/wishlist - Loading {:?}", id, body.name);
    let view = find(&state.graphs, id)?;
    view.load_wishlist(&body.name).await?;
    Ok(Json(view.snapshot(&ScreenerParams::default().query())))
}

async fn view_all(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MultiGraphSnapshot>, AppError> {
    let view = find(&state.graphs, id)?;
    let added = view.view_all().await?;
    info!("POST /graphs/{}/all - Charted {} tickers", id, added.len());
    Ok(Json(view.snapshot(&ScreenerParams::default().query())))
}

async fn select(
    State(state): State<AppState>,
    Path((id, ticker)): Path<(Uuid, String)>,
) -> Result<Json<MultiGraphSnapshot>, AppError> {
    info!("POST /graphs/{}/selection/{}", id, ticker);
    let view = find(&state.graphs, id)?;
    view.select(Ticker::parse(&ticker)?)?;
    Ok(Json(view.snapshot(&ScreenerParams::default().query())))
}

async fn deselect(
    State(state): State<AppState>,
    Path((id, ticker)): Path<(Uuid, String)>,
) -> Result<Json<MultiGraphSnapshot>, AppError> {
    info!("DELETE /graphs/{}/selection/{}", id, ticker);
    let view = find(&state.graphs, id)?;
    let ticker = Ticker::parse(&ticker)?;
    if !view.deselect(&ticker) {
        return Err(AppError::NotFound(format!("{} is not selected", ticker)));
    }
    Ok(Json(view.snapshot(&ScreenerParams::default().query())))
}

async fn toggle_maximize(
    State(state): State<AppState>,
    Path((id, ticker)): Path<(Uuid, String)>,
) -> Result<Json<Maximized>, AppError> {
    let view = find(&state.graphs, id)?;
    let maximized = view.toggle_maximize(&Ticker::parse(&ticker)?)?;
    info!("POST /graphs/{}/maximize/{} - now {:?}", id, ticker, maximized);
    Ok(Json(Maximized { maximized }))
}

async fn set_range(
    State(state): State<AppState>,
    Path((id, ticker)): Path<(Uuid, String)>,
    Json(body): Json<RangeBody>,
) -> Result<StatusCode, AppError> {
    info!("PUT /graphs/{}/range/{} - {}", id, ticker, body.range);
    let view = find(&state.graphs, id)?;
    view.set_range(&Ticker::parse(&ticker)?, body.range)?;
    Ok(StatusCode::ACCEPTED)
}

async fn unmount_graphs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /graphs/{} - Unmounting", id);
    unmount(&state.graphs, id)
}
