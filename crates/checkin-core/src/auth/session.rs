use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::clock;
use crate::models::{TokenGrant, UserProfile};

/// A credential together with its client-computed expiry.
/// Keeping both in one value makes "token present iff expiry present" hold by construction.
#[derive(Clone, PartialEq)]
pub struct IssuedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    pub fn issue(value: String, lifetime_secs: i64, issued_at: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at: clock::expires_at_from(issued_at, lifetime_secs),
        }
    }
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The authenticated state of the current user.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
    pub user: Option<UserProfile>,
}

impl Session {
    pub fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        Self {
            access: IssuedToken::issue(grant.access_token, grant.expires_in, issued_at),
            refresh: IssuedToken::issue(grant.refresh_token, grant.refresh_expires_in, issued_at),
            user: grant.user,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !clock::is_expired(Some(self.refresh.expires_at))
    }

    pub fn refresh_expired(&self) -> bool {
        clock::is_expired(Some(self.refresh.expires_at))
    }

    pub fn access_expiring_soon(&self, buffer: Duration) -> bool {
        clock::is_expiring_soon(Some(self.access.expires_at), buffer)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            access_token: Some(self.access.value.clone()),
            refresh_token: Some(self.refresh.value.clone()),
            access_token_expires_at: Some(self.access.expires_at),
            refresh_token_expires_at: Some(self.refresh.expires_at),
            user: self.user.clone(),
            is_authenticated: self.is_authenticated(),
        }
    }
}

/// Immutable view of the session, and the exact record that gets persisted.
///
/// An empty snapshot (`SessionSnapshot::default()`) means "no session".
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
}

impl SessionSnapshot {
    /// Rebuild a `Session`, rejecting torn records where a token lost its expiry
    /// (or the other way round).
    pub fn into_session(self) -> Option<Session> {
        match (
            self.access_token,
            self.access_token_expires_at,
            self.refresh_token,
            self.refresh_token_expires_at,
        ) {
            (Some(access), Some(access_exp), Some(refresh), Some(refresh_exp)) => Some(Session {
                access: IssuedToken {
                    value: access,
                    expires_at: access_exp,
                },
                refresh: IssuedToken {
                    value: refresh,
                    expires_at: refresh_exp,
                },
                user: self.user,
            }),
            _ => None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.access_token.is_some()
    }
}

impl std::fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .field("has_user", &self.user.is_some())
            .field("is_authenticated", &self.is_authenticated)
            .finish()
    }
}

/// Passive status report for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub access_expiring_soon: bool,
    pub minutes_until_access_expiry: i64,
    pub minutes_until_refresh_expiry: i64,
}
