use thiserror::Error;

use super::legacy_messages;
use crate::api::ApiError;

/// Typed authentication failures surfaced to screens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("This account does not have access to this app")]
    WrongRole,

    #[error("This account is not active")]
    AccountNotActive,

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("User profile not found")]
    UserProfileNotFound,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unable to reach the server: {0}")]
    NetworkError(String),

    #[error("Not authorized: {0}")]
    UnauthorizedError(String),

    #[error("Session expired - please log in again")]
    SessionExpired,
}

impl AuthError {
    /// Map a stable backend error code to a typed error.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "invalid_credentials" => Some(AuthError::InvalidCredentials),
            "wrong_role" => Some(AuthError::WrongRole),
            "account_not_active" => Some(AuthError::AccountNotActive),
            "email_not_verified" => Some(AuthError::EmailNotVerified),
            "user_profile_not_found" => Some(AuthError::UserProfileNotFound),
            "session_expired" | "refresh_token_expired" => Some(AuthError::SessionExpired),
            _ => None,
        }
    }

    /// Classify a failed login call.
    ///
    /// Order: the machine-readable code, then (only if the backend sent no
    /// code) the legacy message matcher, then the HTTP status.
    pub fn classify(err: &ApiError) -> Self {
        match err {
            ApiError::NetworkError(message) => AuthError::NetworkError(message.clone()),
            ApiError::ServerError { message, .. } => AuthError::ServerError(message.clone()),
            ApiError::RateLimited => AuthError::ServerError(err.to_string()),
            ApiError::InvalidResponse(message) | ApiError::InvalidRequest(message) => {
                AuthError::ServerError(message.clone())
            }
            ApiError::NotAuthenticated => AuthError::SessionExpired,
            ApiError::Unauthorized(body)
            | ApiError::AccessDenied(body)
            | ApiError::NotFound(body)
            | ApiError::BadRequest { body, .. } => {
                if let Some(code) = body.code.as_deref() {
                    if let Some(classified) = Self::from_code(code) {
                        return classified;
                    }
                } else if let Some(classified) = body
                    .message
                    .as_deref()
                    .and_then(legacy_messages::classify_message)
                {
                    return classified;
                }
                Self::from_status(err.status().unwrap_or_default(), &body.to_string())
            }
        }
    }

    fn from_status(status: u16, detail: &str) -> Self {
        match status {
            400 | 401 | 422 => AuthError::InvalidCredentials,
            403 => AuthError::UnauthorizedError(detail.to_string()),
            _ => AuthError::ServerError(format!("Unexpected status {}: {}", status, detail)),
        }
    }

    /// Whether the user must go back to the login screen
    pub fn requires_login(&self) -> bool {
        !matches!(self, AuthError::NetworkError(_) | AuthError::ServerError(_))
    }
}
