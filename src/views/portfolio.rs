use std::borrow::Cow;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::AppError;
use crate::external::{BrokerCredentials, BrokerSession, FetchError, MarketBackend};
use crate::models::{Holding, HoldingView};
use crate::services::derived_metrics::{portfolio_totals, PortfolioTotals};
use crate::services::{
    compose, FetchFn, FetchGate, PollKey, PollPolicy, PollSession, PollStatus, SortValue, ViewQuery,
    ViewRow, ViewSnapshot,
};
use crate::views::View;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingSort {
    Name,
    DayChange,
    PlPct,
    Pe,
    Value,
}

impl ViewRow for Holding {
    type SortKey = HoldingSort;
    type Filter = ();

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(self.ticker.as_str()), Cow::Borrowed(&self.name)]
    }

    fn sort_value(&self, key: HoldingSort) -> SortValue<'_> {
        match key {
            HoldingSort::Name => SortValue::Text(Cow::Borrowed(&self.name)),
            HoldingSort::DayChange => SortValue::Number(Some(self.day_change_pct)),
            HoldingSort::PlPct => SortValue::Number(self.pl_pct()),
            HoldingSort::Pe => SortValue::Number(self.pe),
            HoldingSort::Value => SortValue::Number(Some(self.current_value())),
        }
    }

    fn matches_filter(&self, _filter: &()) -> bool {
        true
    }
}

pub type HoldingQuery = ViewQuery<HoldingSort, ()>;

/// Holdings are polled only for a session the backend has authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingsKey {
    pub session: BrokerSession,
    pub authenticated: bool,
}

impl PollKey for HoldingsKey {
    fn is_pollable(&self) -> bool {
        self.authenticated
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSnapshot {
    #[serde(flatten)]
    pub view: ViewSnapshot<HoldingView>,
    pub authenticated: bool,
    /// Over every holding, independent of search.
    pub totals: PortfolioTotals,
    pub polling: Option<PollStatus>,
}

struct PortfolioState {
    key: HoldingsKey,
    session: Option<PollSession>,
    torn_down: bool,
}

/// Brokerage holdings with P&L, polled while the session stays authenticated.
pub struct PortfolioView {
    backend: Arc<dyn MarketBackend>,
    policy: PollPolicy,
    gate: FetchGate<HoldingsKey, Holding>,
    state: Mutex<PortfolioState>,
}

impl PortfolioView {
    pub fn new(backend: Arc<dyn MarketBackend>, session: BrokerSession, policy: PollPolicy) -> Self {
        Self {
            backend,
            policy,
            gate: FetchGate::new("portfolio"),
            state: Mutex::new(PortfolioState {
                key: HoldingsKey {
                    session,
                    authenticated: false,
                },
                session: None,
                torn_down: false,
            }),
        }
    }

    /// Checks the brokerage session and starts polling holdings when it is
    /// valid. Returns whether the session is authenticated.
    pub async fn connect(&self) -> bool {
        let session = self.state.lock().key.session.clone();
        let authenticated = match self.backend.auth_check(&session).await {
            Ok(status) => {
                if let Some(reason) = status.error.as_deref().filter(|_| !status.authenticated) {
                    info!("Brokerage session not authenticated: {}", reason);
                }
                status.authenticated
            }
            Err(e) => {
                warn!("Auth check failed: {}", e);
                false
            }
        };

        let mut state = self.state.lock();
        if state.torn_down {
            return false;
        }
        if let Some(old) = state.session.take() {
            old.cancel();
        }
        state.key.authenticated = authenticated;

        if authenticated {
            self.gate.reset(Some(state.key.clone()));
            state.session = PollSession::start(
                &self.gate,
                state.key.clone(),
                holdings_fetch(Arc::clone(&self.backend)),
                self.policy,
            );
        } else {
            let ticket = self.gate.begin(state.key.clone());
            self.gate.commit(ticket, Err(FetchError::AuthRequired));
        }
        authenticated
    }

    /// Restarts polling after the window expired. Re-checks authentication.
    pub async fn resume(&self) -> bool {
        let running = {
            let state = self.state.lock();
            state.torn_down || state.session.as_ref().is_some_and(PollSession::is_running)
        };
        if running {
            return false;
        }
        self.connect().await
    }

    /// Logs out at the backend. Polling stops only once the backend confirms.
    pub async fn logout(&self) -> Result<(), AppError> {
        let session = self.state.lock().key.session.clone();
        self.backend.logout(&session).await?;

        let mut state = self.state.lock();
        if state.torn_down {
            debug!("Logout settled after teardown, view left as is");
            return Ok(());
        }
        if let Some(old) = state.session.take() {
            old.cancel();
        }
        state.key.authenticated = false;
        let ticket = self.gate.begin(state.key.clone());
        self.gate.commit(ticket, Err(FetchError::AuthRequired));
        info!("Brokerage session logged out");
        Ok(())
    }

    pub fn snapshot(&self, query: &HoldingQuery) -> PortfolioSnapshot {
        let gate = self.gate.snapshot();
        let totals = portfolio_totals(gate.state.rows());
        let view = compose(&gate, query, |h: &Holding| HoldingView::from(h));

        let state = self.state.lock();
        PortfolioSnapshot {
            view,
            authenticated: state.key.authenticated,
            totals,
            polling: state.session.as_ref().map(PollSession::status),
        }
    }
}

impl View for PortfolioView {
    fn teardown(&self) {
        let mut state = self.state.lock();
        state.torn_down = true;
        if let Some(session) = state.session.take() {
            session.cancel();
        }
        self.gate.close();
    }
}

fn holdings_fetch(backend: Arc<dyn MarketBackend>) -> FetchFn<HoldingsKey, Holding> {
    Arc::new(move |key: HoldingsKey| {
        let backend = Arc::clone(&backend);
        async move { backend.fetch_holdings(&key.session).await }.boxed()
    })
}

/// Forwards API credentials to the backend and returns the brokerage login
/// URL the browser should be sent to.
pub async fn submit_credentials(
    backend: &dyn MarketBackend,
    credentials: BrokerCredentials,
    login_url: &Url,
) -> Result<Url, AppError> {
    let api_key = credentials.api_key.trim();
    if api_key.is_empty() || credentials.api_secret.trim().is_empty() {
        return Err(AppError::Validation("api_key and api_secret are required".to_string()));
    }

    backend.store_api_credentials(&credentials).await?;

    let mut url = login_url.clone();
    url.query_pairs_mut()
        .append_pair("v", "3")
        .append_pair("api_key", api_key);
    info!("Stored brokerage credentials, redirecting to login");
    Ok(url)
}
