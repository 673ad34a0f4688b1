use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{AppendWishlistRequest, CreateWishlistRequest, Wishlist};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_wishlists).post(create_wishlist))
        // PUT addresses a wishlist by name, DELETE by id
        .route("/:key", put(append_to_wishlist).delete(delete_wishlist))
}

async fn list_wishlists(State(state): State<AppState>) -> Result<Json<Vec<Wishlist>>, AppError> {
    info!("GET /wishlists - Listing wishlists");
    let lists = state.wishlists.list().await.map_err(|e| {
        error!("Failed to list wishlists: {}", e);
        e
    })?;
    Ok(Json(lists))
}

async fn create_wishlist(
    State(state): State<AppState>,
    Json(req): Json<CreateWishlistRequest>,
) -> Result<(StatusCode, Json<Wishlist>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("wishlist name is required".to_string()));
    }
    info!("POST /wishlists - Creating {:?}", name);

    let wishlist = Wishlist {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        symbols: req.symbols,
    };
    let created = state.wishlists.create(wishlist).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn append_to_wishlist(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<AppendWishlistRequest>,
) -> Result<StatusCode, AppError> {
    info!("PUT /wishlists/{} - Appending {} symbols", name, req.symbols.len());
    if req.symbols.is_empty() {
        return Err(AppError::Validation("no symbols to append".to_string()));
    }
    state.wishlists.append(&name, &req.symbols).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_wishlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /wishlists/{}", id);
    state.wishlists.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
