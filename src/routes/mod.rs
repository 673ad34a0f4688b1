pub(crate) mod graphs;
pub(crate) mod health;
pub(crate) mod news;
pub(crate) mod portfolio;
pub(crate) mod recommendations;
pub(crate) mod screener;
pub(crate) mod wishlists;

use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::views::{View, ViewRegistry};

/// Body returned when a view is mounted: its id plus the first snapshot.
#[derive(Debug, Serialize)]
pub struct Mounted<S> {
    pub id: Uuid,
    #[serde(flatten)]
    pub snapshot: S,
}

#[derive(Debug, Serialize)]
pub struct Resumed {
    pub resumed: bool,
}

pub(crate) fn find<V: View>(registry: &ViewRegistry<V>, id: Uuid) -> Result<Arc<V>, AppError> {
    registry
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("view {}", id)))
}

pub(crate) fn unmount<V: View>(registry: &ViewRegistry<V>, id: Uuid) -> Result<StatusCode, AppError> {
    if registry.unmount(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("view {}", id)))
    }
}
