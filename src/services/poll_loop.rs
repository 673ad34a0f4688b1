use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::external::FetchError;
use crate::models::TickerSet;
use crate::services::fetch_gate::FetchGate;

/// Fetch callback shared between ticks of one session.
pub type FetchFn<K, T> =
    Arc<dyn Fn(K) -> BoxFuture<'static, Result<Vec<T>, FetchError>> + Send + Sync>;

/// A key worth polling for. An empty ticker list or a signed-out session is not.
pub trait PollKey: Clone + PartialEq + Debug + Send + Sync + 'static {
    fn is_pollable(&self) -> bool;
}

impl PollKey for TickerSet {
    fn is_pollable(&self) -> bool {
        !self.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Maximum session lifetime. `None` polls until cancelled.
    pub window: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, window: Option<Duration>) -> Self {
        Self { interval, window }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            window: Some(Duration::from_secs(20)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Running,
    /// The window elapsed; resume starts a fresh session.
    Expired,
    /// Stopped by the loop itself after an authentication failure.
    Stopped,
    Cancelled,
}

struct Shared {
    cancelled: AtomicBool,
    ticks: AtomicU64,
    status: Mutex<PollStatus>,
}

impl Shared {
    /// Moves out of `Running` only; terminal states never change.
    fn finish(&self, status: PollStatus) {
        let mut current = self.status.lock();
        if *current == PollStatus::Running {
            *current = status;
        }
    }
}

/// A running refresh loop for one key.
///
/// Chained: the next tick is scheduled only after the current fetch settled,
/// so a session never has more than one request in flight. Dropping the
/// session cancels it.
pub struct PollSession {
    name: &'static str,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl PollSession {
    /// Starts polling `key` through `gate`, or returns `None` when the key is
    /// not pollable.
    pub fn start<K, T>(
        gate: &FetchGate<K, T>,
        key: K,
        fetch: FetchFn<K, T>,
        policy: PollPolicy,
    ) -> Option<Self>
    where
        K: PollKey,
        T: Clone + Send + 'static,
    {
        if !key.is_pollable() {
            debug!(gate = gate.name(), key = ?key, "Key not pollable, no session started");
            return None;
        }

        let shared = Arc::new(Shared {
            cancelled: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            status: Mutex::new(PollStatus::Running),
        });

        info!(
            gate = gate.name(),
            key = ?key,
            interval_ms = policy.interval.as_millis() as u64,
            window_secs = policy.window.map(|w| w.as_secs()),
            "Starting poll session"
        );

        let handle = tokio::spawn(run_loop(gate.clone(), key, fetch, policy, Arc::clone(&shared)));

        Some(Self {
            name: gate.name(),
            shared,
            handle,
        })
    }

    pub fn status(&self) -> PollStatus {
        *self.shared.status.lock()
    }

    /// Number of settled fetches so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.status() == PollStatus::Running
    }

    /// Stops the loop and its in-flight fetch. Safe to call repeatedly.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.handle.abort();
        self.shared.finish(PollStatus::Cancelled);
        debug!(gate = self.name, "Poll session cancelled");
    }
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_loop<K, T>(
    gate: FetchGate<K, T>,
    key: K,
    fetch: FetchFn<K, T>,
    policy: PollPolicy,
    shared: Arc<Shared>,
) where
    K: PollKey,
    T: Clone + Send + 'static,
{
    let deadline = policy.window.map(|w| Instant::now() + w);

    loop {
        if shared.cancelled.load(Ordering::SeqCst) {
            return;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            shared.finish(PollStatus::Expired);
            info!(gate = gate.name(), key = ?key, "Poll window elapsed, session expired");
            return;
        }

        // Checked under the gate lock: once a cancel is followed by a reset or
        // close, this loop can no longer put its key back on the gate.
        let Some(ticket) = gate.begin_if(key.clone(), || !shared.cancelled.load(Ordering::SeqCst))
        else {
            shared.finish(PollStatus::Cancelled);
            debug!(gate = gate.name(), key = ?key, "Gate closed or session cancelled, stopping");
            return;
        };
        let result = fetch(key.clone()).await;

        if shared.cancelled.load(Ordering::SeqCst) {
            debug!(gate = gate.name(), key = ?key, "Session cancelled mid-fetch, dropping result");
            return;
        }

        let auth_lost = matches!(result, Err(FetchError::AuthRequired));
        gate.commit(ticket, result);
        shared.ticks.fetch_add(1, Ordering::SeqCst);

        if auth_lost {
            shared.finish(PollStatus::Stopped);
            info!(gate = gate.name(), key = ?key, "Authentication required, poll session stopped");
            return;
        }

        let next = Instant::now() + policy.interval;
        match deadline {
            Some(d) if d < next => sleep_until(d).await,
            _ => sleep_until(next).await,
        }
    }
}
