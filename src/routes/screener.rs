use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{QuoteView, Ticker, TickerSet};
use crate::routes::{find, unmount, Mounted, Resumed};
use crate::services::SortOrder;
use crate::state::AppState;
use crate::views::screener::{QuoteQuery, QuoteSort, ScreenerSnapshot};
use crate::views::ScreenerView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(mount_screener))
        .route("/:id", get(get_screener).delete(unmount_screener))
        .route("/:id/tickers", put(replace_tickers).post(add_ticker))
        .route("/:id/wishlist", post(load_wishlist))
        .route("/:id/all", post(view_all))
        .route("/:id/resume", post(resume))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScreenerParams {
    #[serde(default)]
    pub search: String,
    pub sort: Option<QuoteSort>,
    pub order: Option<SortOrder>,
}

impl ScreenerParams {
    /// Name ascending unless the caller asks otherwise.
    pub fn query(self) -> QuoteQuery {
        QuoteQuery::default()
            .search(self.search)
            .sort(self.sort.unwrap_or_default(), self.order.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct MountScreener {
    #[serde(default)]
    tickers: Vec<String>,
    wishlist: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplaceTickers {
    tickers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AddTicker {
    ticker: String,
}

#[derive(Debug, Deserialize)]
struct WishlistName {
    name: String,
}

async fn mount_screener(
    State(state): State<AppState>,
    Json(body): Json<MountScreener>,
) -> Result<Json<Mounted<ScreenerSnapshot>>, AppError> {
    info!("POST /screener - Mounting screener");
    let view = ScreenerView::new(
        state.backend.clone(),
        state.wishlists.clone(),
        state.unknown_tickers.clone(),
        state.config.poll_policy(),
    );

    match body.wishlist {
        Some(name) => view.load_wishlist(&name).await.map_err(|e| {
            error!("Failed to load wishlist {:?}: {}", name, e);
            e
        })?,
        None => view.set_tickers(TickerSet::parse(&body.tickers)?),
    }

    let (id, view) = state.screeners.mount(view);
    Ok(Json(Mounted {
        id,
        snapshot: view.snapshot(&ScreenerParams::default().query()),
    }))
}

async fn get_screener(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ScreenerParams>,
) -> Result<Json<ScreenerSnapshot>, AppError> {
    let view = find(&state.screeners, id)?;
    Ok(Json(view.snapshot(&params.query())))
}

async fn replace_tickers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReplaceTickers>,
) -> Result<Json<ScreenerSnapshot>, AppError> {
    info!("PUT /screener/{}/tickers - {} tickers", id, body.tickers.len());
    let view = find(&state.screeners, id)?;
    view.set_tickers(TickerSet::parse(&body.tickers)?);
    Ok(Json(view.snapshot(&ScreenerParams::default().query())))
}

async fn add_ticker(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AddTicker>,
) -> Result<Json<QuoteView>, AppError> {
    info!("POST /screener/{}/tickers - Adding {}", id, body.ticker);
    let view = find(&state.screeners, id)?;
    let ticker = Ticker::parse(&body.ticker)?;
    let quote = view.add_ticker(ticker).await?;
    Ok(Json(QuoteView::from(&quote)))
}

async fn load_wishlist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<WishlistName>,
) -> Result<Json<ScreenerSnapshot>, AppError> {
    info!("POST /screener/{}/wishlist - Loading {:?}", id, body.name);
    let view = find(&state.screeners, id)?;
    view.load_wishlist(&body.name).await?;
    Ok(Json(view.snapshot(&ScreenerParams::default().query())))
}

async fn view_all(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScreenerSnapshot>, AppError> {
    info!("POST /screener/{}/all - Loading every wishlist", id);
    let view = find(&state.screeners, id)?;
    view.view_all().await?;
    Ok(Json(view.snapshot(&ScreenerParams::default().query())))
}

async fn resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Resumed>, AppError> {
    let view = find(&state.screeners, id)?;
    let resumed = view.resume();
    info!("POST /screener/{}/resume - resumed: {}", id, resumed);
    Ok(Json(Resumed { resumed }))
}

async fn unmount_screener(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /screener/{} - Unmounting", id);
    unmount(&state.screeners, id)
}
