use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::external::{BrokerCredentials, BrokerSession};
use crate::routes::{find, unmount, Mounted, Resumed};
use crate::services::SortOrder;
use crate::state::AppState;
use crate::views::portfolio::{submit_credentials, HoldingQuery, HoldingSort, PortfolioSnapshot};
use crate::views::PortfolioView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(mount_portfolio))
        .route("/credentials", post(store_credentials))
        .route("/:id", get(get_portfolio).delete(unmount_portfolio))
        .route("/:id/resume", post(resume))
        .route("/:id/logout", post(logout))
}

#[derive(Debug, Default, Deserialize)]
struct PortfolioParams {
    #[serde(default)]
    search: String,
    sort: Option<HoldingSort>,
    order: Option<SortOrder>,
}

impl PortfolioParams {
    fn query(self) -> HoldingQuery {
        let query = HoldingQuery::default().search(self.search);
        match self.sort {
            Some(key) => query.sort(key, self.order.unwrap_or_default()),
            None => query,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRedirect {
    login_url: String,
}

/// The browser's brokerage cookie, forwarded on every backend call.
fn session_from(headers: &HeaderMap) -> BrokerSession {
    BrokerSession::new(
        headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    )
}

async fn mount_portfolio(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Mounted<PortfolioSnapshot>>, AppError> {
    let session = session_from(&headers);
    info!("POST /portfolio - Mounting portfolio (cookie: {})", session.cookie.is_some());

    let view = PortfolioView::new(state.backend.clone(), session, state.config.poll_policy());
    let authenticated = view.connect().await;
    if !authenticated {
        info!("Portfolio mounted without an authenticated session");
    }

    let (id, view) = state.portfolios.mount(view);
    Ok(Json(Mounted {
        id,
        snapshot: view.snapshot(&HoldingQuery::default()),
    }))
}

async fn get_portfolio(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PortfolioParams>,
) -> Result<Json<PortfolioSnapshot>, AppError> {
    let view = find(&state.portfolios, id)?;
    Ok(Json(view.snapshot(&params.query())))
}

async fn resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Resumed>, AppError> {
    let view = find(&state.portfolios, id)?;
    let resumed = view.resume().await;
    info!("POST /portfolio/{}/resume - resumed: {}", id, resumed);
    Ok(Json(Resumed { resumed }))
}

async fn logout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PortfolioSnapshot>, AppError> {
    info!("POST /portfolio/{}/logout", id);
    let view = find(&state.portfolios, id)?;
    view.logout().await.map_err(|e| {
        error!("Logout failed for portfolio {}: {}", id, e);
        e
    })?;
    Ok(Json(view.snapshot(&HoldingQuery::default())))
}

async fn store_credentials(
    State(state): State<AppState>,
    Json(credentials): Json<BrokerCredentials>,
) -> Result<Json<LoginRedirect>, AppError> {
    info!("POST /portfolio/credentials - Storing brokerage API credentials");
    let url = submit_credentials(
        state.backend.as_ref(),
        credentials,
        &state.config.broker_login_url,
    )
    .await?;
    Ok(Json(LoginRedirect {
        login_url: url.to_string(),
    }))
}

async fn unmount_portfolio(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /portfolio/{} - Unmounting", id);
    unmount(&state.portfolios, id)
}
