//! Refresh deduplication
//!
//! The coordinator owns a single slot holding at most one in-flight refresh.
//! The first caller that finds the slot empty starts the refresh; everyone
//! arriving while it runs attaches to the same shared outcome.

use super::types::TokenState;
use crate::error::AuthError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Outcome handed identically to every waiter
pub(crate) type RefreshOutcome = Result<Arc<TokenState>, AuthError>;

/// Shared handle on one refresh
pub(crate) type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// One outstanding refresh network call
struct PendingRefresh {
    id: u64,
    outcome: SharedRefresh,
}

/// Deduplicates concurrent refresh attempts into a single in-flight operation
#[derive(Default)]
pub(crate) struct RefreshCoordinator {
    slot: Arc<Mutex<Option<PendingRefresh>>>,
    next_id: AtomicU64,
    started: AtomicU64,
}

fn lock(slot: &Mutex<Option<PendingRefresh>>) -> MutexGuard<'_, Option<PendingRefresh>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clear the slot if it still holds refresh `id`
fn release(slot: &Mutex<Option<PendingRefresh>>, id: u64) {
    let mut slot = lock(slot);
    if slot.as_ref().is_some_and(|p| p.id == id) {
        *slot = None;
    }
}

impl RefreshCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attach to the in-flight refresh, or start one with `start`
    ///
    /// The check and the install happen under one lock, so two callers can
    /// never both decide to start. The refresh runs on its own task: dropping
    /// every waiter does not abort the network call. The slot is released
    /// when the refresh ends, even if it panicked.
    pub(crate) fn join_or_start<F>(&self, start: F) -> SharedRefresh
    where
        F: FnOnce(u64) -> BoxFuture<'static, RefreshOutcome>,
    {
        let mut slot = lock(&self.slot);

        if let Some(pending) = slot.as_ref() {
            // A resolved handle is never reused
            if pending.outcome.peek().is_none() {
                debug!(refresh_id = pending.id, "joining in-flight refresh");
                return pending.outcome.clone();
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.started.fetch_add(1, Ordering::Relaxed);
        debug!(refresh_id = id, "starting refresh");

        // The supervisor needs this lock to release the slot, so it cannot
        // do so before the handle is installed below
        let refresh = tokio::spawn(start(id));
        let supervised = Arc::clone(&self.slot);
        let task = tokio::spawn(async move {
            let outcome = match refresh.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(refresh_id = id, error = %e, "refresh task failed");
                    Err(AuthError::expired(format!("refresh task failed: {e}")))
                }
            };
            release(&supervised, id);
            outcome
        });
        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(AuthError::expired(format!("refresh task failed: {e}"))))
        }
        .boxed()
        .shared();

        *slot = Some(PendingRefresh {
            id,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Detach the in-flight refresh, if any
    ///
    /// The network call keeps running for its current waiters; new callers
    /// start afresh.
    pub(crate) fn detach(&self) -> bool {
        lock(&self.slot).take().is_some()
    }

    pub(crate) fn is_pending(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Number of refreshes started over the coordinator's lifetime
    pub(crate) fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }
}
