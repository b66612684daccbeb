// Single-flight refresh coordination
//
// At most one refresh is in flight. Requests that hit an auth failure while it
// runs park on a oneshot and are all settled by the leader in one drain.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::store::CredentialStore;
use crate::error::RefreshError;

/// Outcome delivered to every parked request
pub type RefreshOutcome = Result<String, RefreshError>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    pending: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Refresh coordinator
/// Owns the in-flight flag and the queue of requests waiting on it
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

/// What a request that failed authentication should do next
pub enum RefreshTurn<'a> {
    /// Drive the refresh; settle the lease when it finishes
    Lead(RefreshLease<'a>),
    /// A refresh is already running; wait for its outcome
    Wait(PendingRefresh),
    /// The credential changed since the request was tagged; replay with this one
    Reuse(String),
    /// The session was cleared since the request was tagged
    Ended,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide the next step for a request tagged at `sent_epoch`.
    ///
    /// The in-flight check and the flip to in-flight happen under one lock,
    /// so two callers can never both become leader.
    pub fn begin(&self, store: &CredentialStore, sent_epoch: u64) -> RefreshTurn<'_> {
        let mut state = self.state.lock();

        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.pending.push(tx);
            tracing::debug!(
                pending = state.pending.len(),
                "Refresh in flight, parking request"
            );
            return RefreshTurn::Wait(PendingRefresh { rx });
        }

        let current = store.snapshot();
        if current.epoch != sent_epoch {
            return match current.token {
                Some(token) => RefreshTurn::Reuse(token),
                None => RefreshTurn::Ended,
            };
        }

        state.in_flight = true;
        tracing::debug!("Starting credential refresh");
        RefreshTurn::Lead(RefreshLease {
            coordinator: self,
            settled: false,
        })
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Number of requests parked on the current refresh
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn finish(&self, outcome: RefreshOutcome) -> usize {
        let pending = {
            let mut state = self.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.pending)
        };

        let count = pending.len();
        for tx in pending {
            // Receiver is gone if its caller was cancelled
            let _ = tx.send(outcome.clone());
        }
        count
    }
}

/// Exclusive right to drive the current refresh
///
/// Dropping an unsettled lease rejects all waiters with `Abandoned`.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    /// Hand the new credential to every waiter and go idle.
    /// Returns how many waiters were released.
    pub fn resolve(mut self, token: &str) -> usize {
        self.settled = true;
        self.coordinator.finish(Ok(token.to_string()))
    }

    /// Fail every waiter with `err` and go idle
    pub fn reject(mut self, err: RefreshError) -> usize {
        self.settled = true;
        self.coordinator.finish(Err(err))
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let released = self.coordinator.finish(Err(RefreshError::Abandoned));
            tracing::warn!(released, "Refresh abandoned before completing");
        }
    }
}

/// A request parked until the in-flight refresh settles
pub struct PendingRefresh {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl PendingRefresh {
    pub async fn wait(self) -> RefreshOutcome {
        self.rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}
