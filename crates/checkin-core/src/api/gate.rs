//! Per-request authentication.
//!
//! Every outbound call asks the gate for an [`Authorization`] before it is
//! sent and reports the response status back afterwards. Public endpoints
//! pass through untouched. Everything else needs a valid session (refreshed
//! on demand with the gate's tighter buffer) and gets the access token as
//! its bearer credential. A 401 on an authenticated call ends the session.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use super::{endpoints, ApiError};
use crate::auth::{RefreshCoordinator, SessionState};

/// The outcome of passing the gate.
#[derive(Clone)]
pub struct Authorization {
    bearer: Option<String>,
    /// Session generation the bearer was read from
    generation: Option<u64>,
}

impl Authorization {
    fn public() -> Self {
        Self {
            bearer: None,
            generation: None,
        }
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    pub fn is_public(&self) -> bool {
        self.generation.is_none()
    }
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorization")
            .field("has_bearer", &self.bearer.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct RequestGate {
    state: Arc<SessionState>,
    coordinator: Arc<RefreshCoordinator>,
    buffer: Duration,
    public_paths: Vec<String>,
}

impl RequestGate {
    pub fn new(state: Arc<SessionState>, coordinator: Arc<RefreshCoordinator>, buffer: Duration) -> Self {
        Self {
            state,
            coordinator,
            buffer,
            public_paths: endpoints::PUBLIC.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Add an endpoint that never needs a bearer token.
    pub fn with_public_path(mut self, path: impl Into<String>) -> Self {
        self.public_paths.push(path.into());
        self
    }

    pub fn is_public(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let path = path.trim_end_matches('/');
        self.public_paths
            .iter()
            .any(|public| public.trim_end_matches('/') == path)
    }

    /// Decide whether a request may go out and with which credential.
    ///
    /// `public` marks a request as unauthenticated regardless of its path.
    pub async fn authorize(&self, path: &str, public: bool) -> Result<Authorization, ApiError> {
        if public || self.is_public(path) {
            return Ok(Authorization::public());
        }

        if !self.coordinator.ensure_valid_with(self.buffer).await {
            debug!(path, "Blocking request without a usable session");
            return Err(ApiError::NotAuthenticated);
        }

        // Read token and generation together so a 401 is attributed to the right session
        let (session, generation) = self.state.current();
        match session {
            Some(session) => Ok(Authorization {
                bearer: Some(session.access.value),
                generation: Some(generation),
            }),
            None => Err(ApiError::NotAuthenticated),
        }
    }

    /// Feed a response status back. Returns true if it ended the session.
    pub fn observe(&self, authorization: &Authorization, status: u16) -> bool {
        let Some(generation) = authorization.generation else {
            return false;
        };
        if status != 401 {
            return false;
        }
        if self.state.clear_if_current(generation) {
            warn!("Server rejected the access token, session cleared");
            true
        } else {
            false
        }
    }
}
