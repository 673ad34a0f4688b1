use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};

use crate::external::FetchError;

/// Where a gated data slice currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Ready(Vec<T>),
    Empty,
    Failed(FetchError),
}

impl<T> LoadState<T> {
    pub fn rows(&self) -> &[T] {
        match self {
            LoadState::Ready(rows) => rows,
            _ => &[],
        }
    }
}

/// Proof that a fetch was issued for `key` at `generation`.
///
/// Only the ticket of the most recent `begin` can commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    generation: u64,
    key: K,
}

impl<K> Ticket<K> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

#[derive(Debug, Clone)]
pub struct GateSnapshot<K, T> {
    pub key: Option<K>,
    pub state: LoadState<T>,
    pub refreshing: bool,
    pub generation: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    Applied,
    Stale,
    Closed,
}

struct GateState<K, T> {
    generation: u64,
    key: Option<K>,
    state: LoadState<T>,
    refreshing: bool,
    in_flight: Option<AbortHandle>,
    closed: bool,
    updated_at: Option<DateTime<Utc>>,
}

/// Serializes async fetches for one data slice.
///
/// Every `begin` bumps the generation; a result is applied only when it
/// carries the current generation and the gate has not been closed. A new key
/// discards the old rows immediately, the same key keeps them visible and
/// flags a refresh instead.
pub struct FetchGate<K, T> {
    name: &'static str,
    inner: Arc<Mutex<GateState<K, T>>>,
}

impl<K, T> Clone for FetchGate<K, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> FetchGate<K, T>
where
    K: Clone + PartialEq + Debug,
    T: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(GateState {
                generation: 0,
                key: None,
                state: LoadState::Idle,
                refreshing: false,
                in_flight: None,
                closed: false,
                updated_at: None,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Issues a ticket for `key`. On a closed gate nothing changes and the
    /// ticket can never commit.
    pub fn begin(&self, key: K) -> Ticket<K> {
        let mut inner = self.inner.lock();
        Self::begin_locked(&mut inner, key)
    }

    /// Like `begin`, but only when `proceed` still holds under the gate lock
    /// and the gate is open. Lets a loop observe its own cancellation
    /// atomically with respect to `reset` and `close`.
    pub fn begin_if<P>(&self, key: K, proceed: P) -> Option<Ticket<K>>
    where
        P: FnOnce() -> bool,
    {
        let mut inner = self.inner.lock();
        if inner.closed || !proceed() {
            return None;
        }
        Some(Self::begin_locked(&mut inner, key))
    }

    fn begin_locked(inner: &mut GateState<K, T>, key: K) -> Ticket<K> {
        if inner.closed {
            return Ticket {
                generation: inner.generation,
                key,
            };
        }
        inner.generation += 1;

        // Whatever was in flight now belongs to an older generation.
        if let Some(handle) = inner.in_flight.take() {
            handle.abort();
        }

        let settled = matches!(
            inner.state,
            LoadState::Ready(_) | LoadState::Empty | LoadState::Failed(_)
        );
        if inner.key.as_ref() == Some(&key) {
            inner.refreshing = settled;
        } else {
            inner.key = Some(key.clone());
            inner.state = LoadState::Loading;
            inner.refreshing = false;
        }

        Ticket {
            generation: inner.generation,
            key,
        }
    }

    /// Switches to `key` without issuing a fetch: `Loading` for a key, `Idle`
    /// for none. Anything in flight becomes stale.
    pub fn reset(&self, key: Option<K>) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.generation += 1;
        if let Some(handle) = inner.in_flight.take() {
            handle.abort();
        }
        inner.state = if key.is_some() { LoadState::Loading } else { LoadState::Idle };
        inner.key = key;
        inner.refreshing = false;
    }

    /// Applies a settled result if `ticket` is still current.
    pub fn commit(&self, ticket: Ticket<K>, result: Result<Vec<T>, FetchError>) -> CommitOutcome {
        let mut inner = self.inner.lock();

        if inner.closed {
            debug!(gate = self.name, key = ?ticket.key, "Dropping result for closed gate");
            return CommitOutcome::Closed;
        }
        if ticket.generation != inner.generation {
            debug!(
                gate = self.name,
                key = ?ticket.key,
                stale = ticket.generation,
                current = inner.generation,
                "Dropping stale result"
            );
            return CommitOutcome::Stale;
        }

        inner.state = match result {
            Ok(rows) if rows.is_empty() => LoadState::Empty,
            Ok(rows) => LoadState::Ready(rows),
            Err(e) => {
                match &e {
                    FetchError::AuthRequired | FetchError::RateLimited => {
                        warn!(gate = self.name, key = ?ticket.key, "Fetch failed: {}", e)
                    }
                    _ => error!(gate = self.name, key = ?ticket.key, "Fetch failed: {}", e),
                }
                LoadState::Failed(e)
            }
        };
        inner.refreshing = false;
        inner.in_flight = None;
        inner.updated_at = Some(Utc::now());
        CommitOutcome::Applied
    }

    /// Fetches inline: begin, await, commit.
    pub async fn run<F>(&self, key: K, fetch: F) -> CommitOutcome
    where
        F: Future<Output = Result<Vec<T>, FetchError>>,
    {
        let ticket = self.begin(key);
        let result = fetch.await;
        self.commit(ticket, result)
    }

    /// Closes the gate: aborts the in-flight fetch and refuses every later
    /// commit. Returns false when it was already closed.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.closed = true;
        inner.refreshing = false;
        if let Some(handle) = inner.in_flight.take() {
            handle.abort();
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn current_key(&self) -> Option<K> {
        self.inner.lock().key.clone()
    }

    pub fn snapshot(&self) -> GateSnapshot<K, T> {
        let inner = self.inner.lock();
        GateSnapshot {
            key: inner.key.clone(),
            state: inner.state.clone(),
            refreshing: inner.refreshing,
            generation: inner.generation,
            updated_at: inner.updated_at,
            closed: inner.closed,
        }
    }
}

impl<K, T> FetchGate<K, T>
where
    K: Clone + PartialEq + Debug + Send + 'static,
    T: Clone + Send + 'static,
{
    /// Fetches in the background. A later `begin` or `close` aborts the task.
    pub fn spawn<F>(&self, key: K, fetch: F)
    where
        F: Future<Output = Result<Vec<T>, FetchError>> + Send + 'static,
    {
        let ticket = self.begin(key);
        let generation = ticket.generation;
        let gate = self.clone();

        let handle = tokio::spawn(async move {
            let result = fetch.await;
            gate.commit(ticket, result);
        });

        let mut inner = self.inner.lock();
        if inner.closed || inner.generation != generation {
            handle.abort();
        } else {
            inner.in_flight = Some(handle.abort_handle());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    fn gate() -> FetchGate<String, u32> {
        FetchGate::new("test")
    }

    #[test]
    fn test_begin_new_key_discards_rows() {
        let gate = gate();
        let t = gate.begin("A".to_string());
        assert_eq!(gate.commit(t, Ok(vec![1, 2])), CommitOutcome::Applied);
        assert_eq!(gate.snapshot().state, LoadState::Ready(vec![1, 2]));

        gate.begin("B".to_string());
        let snap = gate.snapshot();
        assert_eq!(snap.state, LoadState::Loading);
        assert!(!snap.refreshing);
        assert_eq!(snap.key.as_deref(), Some("B"));
    }

    #[test]
    fn test_begin_same_key_keeps_rows_and_flags_refresh() {
        let gate = gate();
        let t = gate.begin("A".to_string());
        gate.commit(t, Ok(vec![7]));

        gate.begin("A".to_string());
        let snap = gate.snapshot();
        assert_eq!(snap.state, LoadState::Ready(vec![7]));
        assert!(snap.refreshing);
    }

    #[test]
    fn test_reset_invalidates_outstanding_tickets() {
        let gate = gate();
        let t = gate.begin("A".to_string());
        gate.reset(Some("B".to_string()));
        assert_eq!(gate.commit(t, Ok(vec![1])), CommitOutcome::Stale);
        assert_eq!(gate.snapshot().state, LoadState::Loading);

        // first fetch of the new key is a load, not a refresh
        gate.begin("B".to_string());
        assert!(!gate.snapshot().refreshing);

        gate.reset(None);
        assert_eq!(gate.snapshot().state, LoadState::Idle);
        assert!(gate.current_key().is_none());
    }

    #[test]
    fn test_stale_ticket_is_dropped() {
        let gate = gate();
        let a = gate.begin("A".to_string());
        let b = gate.begin("B".to_string());

        assert_eq!(gate.commit(b, Ok(vec![2])), CommitOutcome::Applied);
        assert_eq!(gate.commit(a, Ok(vec![1])), CommitOutcome::Stale);
        assert_eq!(gate.snapshot().state, LoadState::Ready(vec![2]));
    }

    #[test]
    fn test_each_outcome_maps_to_one_state() {
        let gate = gate();
        let t = gate.begin("A".to_string());
        gate.commit(t, Ok(vec![]));
        assert_eq!(gate.snapshot().state, LoadState::Empty);

        let t = gate.begin("A".to_string());
        gate.commit(t, Err(FetchError::Network("boom".into())));
        let snap = gate.snapshot();
        assert_eq!(snap.state, LoadState::Failed(FetchError::Network("boom".into())));
        assert!(!snap.refreshing);
        assert!(snap.state.rows().is_empty());
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let gate = gate();
        let t = gate.begin("A".to_string());
        assert!(gate.close());
        assert!(!gate.close());
        assert_eq!(gate.commit(t, Ok(vec![1])), CommitOutcome::Closed);
        assert_eq!(gate.snapshot().state, LoadState::Loading);
    }

    #[test]
    fn test_closed_gate_ignores_begin_and_reset() {
        let gate = gate();
        let t = gate.begin("A".to_string());
        gate.commit(t, Ok(vec![1]));
        gate.close();
        let before = gate.snapshot();

        let late = gate.begin("B".to_string());
        gate.reset(Some("C".to_string()));
        assert_eq!(gate.commit(late, Ok(vec![2])), CommitOutcome::Closed);

        let after = gate.snapshot();
        assert_eq!(after.key.as_deref(), Some("A"));
        assert_eq!(after.state, LoadState::Ready(vec![1]));
        assert_eq!(after.generation, before.generation);
        assert!(!after.refreshing);
    }

    #[test]
    fn test_begin_if_checks_under_lock() {
        let gate = gate();
        assert!(gate.begin_if("A".to_string(), || false).is_none());
        assert_eq!(gate.snapshot().generation, 0);
        assert_eq!(gate.snapshot().state, LoadState::Idle);

        let t = gate.begin_if("A".to_string(), || true).unwrap();
        assert_eq!(t.generation(), 1);

        gate.close();
        assert!(gate.begin_if("A".to_string(), || true).is_none());
    }

    #[tokio::test]
    async fn test_slow_old_key_never_overwrites_new_key() {
        let gate = gate();

        gate.spawn("A".to_string(), async {
            sleep(Duration::from_millis(150)).await;
            Ok(vec![1])
        });
        gate.spawn("B".to_string(), async {
            sleep(Duration::from_millis(10)).await;
            Ok(vec![2])
        });

        sleep(Duration::from_millis(300)).await;
        let snap = gate.snapshot();
        assert_eq!(snap.key.as_deref(), Some("B"));
        assert_eq!(snap.state, LoadState::Ready(vec![2]));
    }

    #[tokio::test]
    async fn test_inline_run_loses_to_later_begin() {
        let gate = gate();
        let slow = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.run("A".to_string(), async {
                    sleep(Duration::from_millis(100)).await;
                    Ok(vec![1])
                })
                .await
            })
        };

        sleep(Duration::from_millis(20)).await;
        let outcome = gate.run("B".to_string(), async { Ok(vec![2]) }).await;
        assert_eq!(outcome, CommitOutcome::Applied);
        assert_eq!(slow.await.unwrap(), CommitOutcome::Stale);
        assert_eq!(gate.snapshot().state, LoadState::Ready(vec![2]));
    }

    #[tokio::test]
    async fn test_close_with_fetch_in_flight_leaves_state_untouched() {
        let gate = gate();
        gate.spawn("A".to_string(), async {
            sleep(Duration::from_millis(50)).await;
            Ok(vec![1])
        });
        gate.close();

        sleep(Duration::from_millis(120)).await;
        let snap = gate.snapshot();
        assert_eq!(snap.state, LoadState::Loading);
        assert!(snap.closed);
        assert!(snap.updated_at.is_none());
    }
}
