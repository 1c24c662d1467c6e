//! The authoritative in-memory session.
//!
//! `SessionState` is the only writer of the persisted snapshot and of the
//! transport's bearer credential. Every mutation happens under one write lock
//! that is never held across an `.await`, so readers observe either a fully
//! installed session or none at all.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::session::Session;
use super::{SessionSnapshot, SessionStore};
use crate::api::AuthTransport;
use crate::models::{TokenGrant, UserProfile};

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    /// Bumped by every login and clear. Work that started against an older
    /// generation (a refresh, a request that came back 401) must not touch
    /// the session that replaced it.
    generation: u64,
}

pub struct SessionState {
    inner: RwLock<Inner>,
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn AuthTransport>,
}

impl SessionState {
    pub fn new(store: Arc<dyn SessionStore>, transport: Arc<dyn AuthTransport>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            store,
            transport,
        }
    }

    /// Load the persisted snapshot, if any. Returns true if a usable session was restored.
    ///
    /// Unreadable, torn, or refresh-expired snapshots are deleted.
    pub fn restore(&self) -> bool {
        let snapshot = match self.store.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No session data found");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session");
                self.delete_persisted();
                return false;
            }
        };

        match snapshot.into_session() {
            Some(session) if !session.refresh_expired() => {
                let mut inner = self.write();
                inner.generation += 1;
                self.transport.set_bearer(Some(&session.access.value));
                inner.session = Some(session);
                info!("Session restored");
                true
            }
            Some(_) => {
                info!("Stored session has an expired refresh token");
                self.delete_persisted();
                false
            }
            None => {
                warn!("Stored session is incomplete, discarding");
                self.delete_persisted();
                false
            }
        }
    }

    /// Install a brand-new session from a login response.
    pub fn apply_login_result(&self, grant: TokenGrant) -> SessionSnapshot {
        let session = Session::from_grant(grant, Utc::now());
        let mut inner = self.write();
        inner.generation += 1;
        let snapshot = self.install(&mut inner, session);
        info!(generation = inner.generation, "Session installed");
        snapshot
    }

    /// Replace tokens after a refresh. Keeps the current user when the
    /// response carries none. Returns false (and changes nothing) if there is
    /// no session to refresh.
    pub fn apply_refresh_result(&self, grant: TokenGrant) -> bool {
        let mut inner = self.write();
        self.replace_tokens(&mut inner, grant)
    }

    /// Like `apply_refresh_result`, but only if the session is still the one
    /// the refresh was started for.
    pub(crate) fn apply_refresh_if_current(&self, generation: u64, grant: TokenGrant) -> bool {
        let mut inner = self.write();
        if inner.generation != generation {
            debug!(
                started = generation,
                current = inner.generation,
                "Session superseded during refresh"
            );
            return false;
        }
        self.replace_tokens(&mut inner, grant)
    }

    /// Shallow-merge fields into the user profile. A no-op without a session:
    /// a profile edit must never bring a destroyed session back.
    pub fn update_user_fields(&self, partial: Map<String, Value>) -> bool {
        let mut inner = self.write();
        let Some(session) = inner.session.as_mut() else {
            debug!("Ignoring profile update without a session");
            return false;
        };
        session
            .user
            .get_or_insert_with(UserProfile::default)
            .merge(partial);
        let snapshot = session.snapshot();
        self.persist(&snapshot);
        true
    }

    /// Wipe the session from memory, the transport, and storage.
    pub fn clear(&self) {
        let mut inner = self.write();
        self.clear_locked(&mut inner);
    }

    /// Clear only if nothing has replaced the session since `generation`.
    pub(crate) fn clear_if_current(&self, generation: u64) -> bool {
        let mut inner = self.write();
        if inner.generation != generation {
            return false;
        }
        self.clear_locked(&mut inner);
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.read()
            .session
            .as_ref()
            .map(Session::snapshot)
            .unwrap_or_default()
    }

    /// The current session together with its generation.
    pub(crate) fn current(&self) -> (Option<Session>, u64) {
        let inner = self.read();
        (inner.session.clone(), inner.generation)
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().session.as_ref().map(|s| s.access.value.clone())
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.read().session.as_ref().and_then(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read()
            .session
            .as_ref()
            .map(Session::is_authenticated)
            .unwrap_or(false)
    }

    fn replace_tokens(&self, inner: &mut Inner, grant: TokenGrant) -> bool {
        let Some(current) = inner.session.as_ref() else {
            debug!("Ignoring refresh result without a session");
            return false;
        };
        let previous_user = current.user.clone();
        let mut session = Session::from_grant(grant, Utc::now());
        if session.user.is_none() {
            session.user = previous_user;
        }
        self.install(inner, session);
        true
    }

    fn install(&self, inner: &mut Inner, session: Session) -> SessionSnapshot {
        let snapshot = session.snapshot();
        self.transport.set_bearer(Some(&session.access.value));
        inner.session = Some(session);
        self.persist(&snapshot);
        snapshot
    }

    fn clear_locked(&self, inner: &mut Inner) {
        let had_session = inner.session.take().is_some();
        inner.generation += 1;
        self.transport.set_bearer(None);
        self.delete_persisted();
        if had_session {
            info!(generation = inner.generation, "Session cleared");
        }
    }

    // Callers hold the write lock, so saves land in the same order as the
    // in-memory mutations they mirror.
    fn persist(&self, snapshot: &SessionSnapshot) {
        if let Err(e) = self.store.save(snapshot) {
            warn!(error = %e, "Failed to save session");
        }
    }

    fn delete_persisted(&self) {
        if let Err(e) = self.store.delete() {
            warn!(error = %e, "Failed to delete persisted session");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
