//! The facade screens talk to: login, logout, and session queries.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::{clock, AuthError, RefreshCoordinator, SessionState, SessionStatus, SessionStore};
use crate::api::{AuthTransport, RequestGate};
use crate::config::Config;
use crate::models::{Credentials, UserProfile};

/// Upper bound on the server-side logout call; local logout never waits longer.
const LOGOUT_TIMEOUT_SECS: u64 = 5;

/// Profile statuses that block sign-in.
const INACTIVE_STATUSES: &[&str] = &["inactive", "suspended", "disabled", "deleted"];

pub struct SessionManager {
    state: Arc<SessionState>,
    coordinator: Arc<RefreshCoordinator>,
    transport: Arc<dyn AuthTransport>,
    config: Config,
}

impl SessionManager {
    /// Wire up the session components leaf-first and restore any persisted session.
    pub fn new(transport: Arc<dyn AuthTransport>, store: Arc<dyn SessionStore>, config: Config) -> Self {
        let state = Arc::new(SessionState::new(store, Arc::clone(&transport)));
        state.restore();
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&state),
            Arc::clone(&transport),
            config.passive_buffer(),
        ));
        Self {
            state,
            coordinator,
            transport,
            config,
        }
    }

    /// Sign in and install a new session, replacing any existing one.
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, AuthError> {
        let grant = match self.transport.login(credentials).await {
            Ok(grant) => grant,
            Err(e) => {
                let classified = AuthError::classify(&e);
                error!(error = %e, kind = ?classified, "Login failed");
                return Err(classified);
            }
        };

        let Some(user) = grant.user.clone() else {
            warn!("Login response carried no user profile");
            return Err(AuthError::UserProfileNotFound);
        };
        if user
            .status()
            .is_some_and(|status| INACTIVE_STATUSES.contains(&status.to_ascii_lowercase().as_str()))
        {
            warn!(status = ?user.status(), "Account is not active");
            return Err(AuthError::AccountNotActive);
        }
        if !self.config.role_allowed(user.role()) {
            warn!(role = ?user.role(), "Account role is not allowed in this client");
            return Err(AuthError::WrongRole);
        }

        self.state.apply_login_result(grant);
        info!(user_id = ?user.id(), "Login successful");
        Ok(user)
    }

    /// End the session. The server is told on a best-effort basis; local
    /// state and storage are always wiped, even if that call fails or hangs.
    pub async fn logout(&self) {
        if self.state.access_token().is_some() {
            let timeout = StdDuration::from_secs(LOGOUT_TIMEOUT_SECS);
            match tokio::time::timeout(timeout, self.transport.logout()).await {
                Ok(Ok(())) => info!("Server session revoked"),
                Ok(Err(e)) => warn!(error = %e, "Server logout failed, clearing locally"),
                Err(_) => warn!(timeout_secs = LOGOUT_TIMEOUT_SECS, "Server logout timed out, clearing locally"),
            }
        }
        self.state.clear();
    }

    /// True if the session is usable, refreshing it first if it is about to expire.
    pub async fn ensure_valid_token(&self) -> bool {
        self.coordinator.ensure_valid().await
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// Merge local profile edits. Does nothing when signed out.
    pub fn update_user_fields(&self, partial: Map<String, Value>) -> bool {
        self.state.update_user_fields(partial)
    }

    /// Passive status check, no network.
    pub fn status(&self) -> SessionStatus {
        let snapshot = self.state.snapshot();
        SessionStatus {
            authenticated: snapshot.is_authenticated,
            access_expiring_soon: snapshot.has_session()
                && clock::is_expiring_soon(snapshot.access_token_expires_at, self.config.passive_buffer()),
            minutes_until_access_expiry: clock::minutes_until_expiry(snapshot.access_token_expires_at),
            minutes_until_refresh_expiry: clock::minutes_until_expiry(snapshot.refresh_token_expires_at),
        }
    }

    /// A gate for the API client, sharing this manager's state and coordinator.
    pub fn request_gate(&self) -> RequestGate {
        RequestGate::new(
            Arc::clone(&self.state),
            Arc::clone(&self.coordinator),
            self.gate_buffer(),
        )
    }

    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn gate_buffer(&self) -> Duration {
        self.config.gate_buffer()
    }
}
