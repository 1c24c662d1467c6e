//! Single-flight token refresh.
//!
//! Many requests can notice an expiring access token at the same moment.
//! Only one refresh call may go out, and every caller has to see its single
//! outcome. The first caller spawns the refresh as a tokio task and parks a
//! `Shared` handle to it in `in_flight`; later callers clone that handle
//! instead of starting their own. The task empties the slot once it settles.
//!
//! A refresh failure is never retried: it ends the session and the user has
//! to log in again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error, info, warn};

use super::clock;
use super::session::Session;
use super::SessionState;
use crate::api::AuthTransport;

type RefreshOutcome = Shared<BoxFuture<'static, bool>>;

struct InFlight {
    id: u64,
    outcome: RefreshOutcome,
}

type Slot = Arc<Mutex<Option<InFlight>>>;

enum Join {
    Wait(RefreshOutcome),
    Ready(bool),
}

enum Check {
    NoSession,
    RefreshExpired(u64),
    Valid,
    NeedsRefresh(Session, u64),
}

pub struct RefreshCoordinator {
    state: Arc<SessionState>,
    transport: Arc<dyn AuthTransport>,
    buffer: Duration,
    in_flight: Slot,
    next_id: AtomicU64,
}

impl RefreshCoordinator {
    /// `buffer` is the default "expiring soon" window used by [`ensure_valid`](Self::ensure_valid).
    pub fn new(state: Arc<SessionState>, transport: Arc<dyn AuthTransport>, buffer: Duration) -> Self {
        Self {
            state,
            transport,
            buffer,
            in_flight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// True if the session is usable, refreshing first when needed.
    pub async fn ensure_valid(&self) -> bool {
        self.ensure_valid_with(self.buffer).await
    }

    pub async fn ensure_valid_with(&self, buffer: Duration) -> bool {
        match self.check(buffer) {
            Check::NoSession => false,
            Check::RefreshExpired(generation) => self.expire(generation),
            Check::Valid => true,
            Check::NeedsRefresh(..) => match self.join_or_start(buffer) {
                Join::Wait(outcome) => outcome.await,
                Join::Ready(valid) => valid,
            },
        }
    }

    /// Whether a refresh call is outstanding right now.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    fn check(&self, buffer: Duration) -> Check {
        let (session, generation) = self.state.current();
        let Some(session) = session else {
            return Check::NoSession;
        };
        if clock::is_expired(Some(session.refresh.expires_at)) {
            return Check::RefreshExpired(generation);
        }
        if !clock::is_expiring_soon(Some(session.access.expires_at), buffer) {
            return Check::Valid;
        }
        Check::NeedsRefresh(session, generation)
    }

    fn expire(&self, generation: u64) -> bool {
        info!("Refresh token expired, ending session");
        self.state.clear_if_current(generation);
        false
    }

    /// Attach to the outstanding refresh, or start one. A re-check under the
    /// slot lock may show that no refresh is needed any more.
    fn join_or_start(&self, buffer: Duration) -> Join {
        let mut slot = lock(&self.in_flight);
        if let Some(flight) = slot.as_ref() {
            debug!(flight = flight.id, "Joining in-flight refresh");
            return Join::Wait(flight.outcome.clone());
        }

        // A refresh may have settled between the first check and taking the lock
        let (session, generation) = match self.check(buffer) {
            Check::NeedsRefresh(session, generation) => (session, generation),
            Check::Valid => return Join::Ready(true),
            Check::NoSession => return Join::Ready(false),
            Check::RefreshExpired(generation) => return Join::Ready(self.expire(generation)),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(flight = id, generation, "Starting token refresh");

        let state = Arc::clone(&self.state);
        let transport = Arc::clone(&self.transport);
        let task_slot = Arc::clone(&self.in_flight);
        let refresh_token = session.refresh.value;
        let task = tokio::spawn(async move {
            let refreshed = run_refresh(&state, transport.as_ref(), generation, &refresh_token).await;
            settle(&task_slot, id);
            refreshed
        });

        let waiter_slot = Arc::clone(&self.in_flight);
        let outcome = async move {
            let refreshed = match task.await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    error!(error = %e, "Refresh task did not complete");
                    false
                }
            };
            // The task normally settles itself; this covers a panicked task.
            settle(&waiter_slot, id);
            refreshed
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            outcome: outcome.clone(),
        });
        Join::Wait(outcome)
    }
}

async fn run_refresh(
    state: &SessionState,
    transport: &dyn AuthTransport,
    generation: u64,
    refresh_token: &str,
) -> bool {
    match transport.refresh(refresh_token).await {
        Ok(grant) => {
            if state.apply_refresh_if_current(generation, grant) {
                info!("Access token refreshed");
                true
            } else {
                // Logged out (or logged in again) while the call was out
                state.is_authenticated()
            }
        }
        Err(e) => {
            warn!(error = %e, "Token refresh failed, ending session");
            if state.clear_if_current(generation) {
                false
            } else {
                state.is_authenticated()
            }
        }
    }
}

fn settle(slot: &Slot, id: u64) {
    let mut slot = lock(slot);
    if slot.as_ref().is_some_and(|flight| flight.id == id) {
        *slot = None;
    }
}

fn lock(slot: &Slot) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
