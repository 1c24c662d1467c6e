//! Compatibility shim for backends that only send free-text error messages.
//!
//! Substring matching is brittle; it is consulted only when the error body
//! carries no machine-readable `code`. Remove once every endpoint sends codes.

use super::AuthError;

/// Ordered so that more specific phrases win over generic ones.
const MESSAGE_PATTERNS: &[(&str, LegacyKind)] = &[
    ("email not confirmed", LegacyKind::EmailNotVerified),
    ("email not verified", LegacyKind::EmailNotVerified),
    ("profile not found", LegacyKind::UserProfileNotFound),
    ("user not found", LegacyKind::UserProfileNotFound),
    ("not active", LegacyKind::AccountNotActive),
    ("inactive", LegacyKind::AccountNotActive),
    ("suspended", LegacyKind::AccountNotActive),
    ("disabled", LegacyKind::AccountNotActive),
    ("refresh token expired", LegacyKind::SessionExpired),
    ("session expired", LegacyKind::SessionExpired),
    ("invalid login credentials", LegacyKind::InvalidCredentials),
    ("invalid credentials", LegacyKind::InvalidCredentials),
    ("wrong password", LegacyKind::InvalidCredentials),
    ("insufficient role", LegacyKind::WrongRole),
    ("not an organizer", LegacyKind::WrongRole),
];

#[derive(Clone, Copy)]
enum LegacyKind {
    InvalidCredentials,
    WrongRole,
    AccountNotActive,
    EmailNotVerified,
    UserProfileNotFound,
    SessionExpired,
}

impl From<LegacyKind> for AuthError {
    fn from(kind: LegacyKind) -> Self {
        match kind {
            LegacyKind::InvalidCredentials => AuthError::InvalidCredentials,
            LegacyKind::WrongRole => AuthError::WrongRole,
            LegacyKind::AccountNotActive => AuthError::AccountNotActive,
            LegacyKind::EmailNotVerified => AuthError::EmailNotVerified,
            LegacyKind::UserProfileNotFound => AuthError::UserProfileNotFound,
            LegacyKind::SessionExpired => AuthError::SessionExpired,
        }
    }
}

pub fn classify_message(message: &str) -> Option<AuthError> {
    let lower = message.to_lowercase();
    MESSAGE_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, kind)| AuthError::from(*kind))
}
