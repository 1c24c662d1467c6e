use serde_json::Value;
use thiserror::Error;

/// Keys older endpoints use for the human-readable message, in order of preference.
const MESSAGE_KEYS: &[&str] = &["message", "error", "msg"];

/// Machine-readable error body returned by the backend:
/// `{"code": "email_not_verified", "message": "..."}`.
/// Either field may be missing on older endpoints, and framework defaults
/// often add an `error` field next to `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ErrorBody {
    /// Parse a response body, keeping the raw (truncated) text as the message
    /// when it is not a JSON object with a code or message.
    pub fn parse(body: &str) -> Self {
        if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
            let code = fields
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string);
            let message = MESSAGE_KEYS
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str))
                .map(ApiError::truncate_body);
            if code.is_some() || message.is_some() {
                return ErrorBody { code, message };
            }
        }

        let trimmed = body.trim();
        ErrorBody {
            code: None,
            message: (!trimmed.is_empty()).then(|| ApiError::truncate_body(trimmed)),
        }
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{} ({})", message, code),
            (Some(code), None) => write!(f, "{}", code),
            (None, Some(message)) => write!(f, "{}", message),
            (None, None) => write!(f, "no details"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired or revoked: {0}")]
    Unauthorized(ErrorBody),

    #[error("Access denied: {0}")]
    AccessDenied(ErrorBody),

    #[error("Resource not found: {0}")]
    NotFound(ErrorBody),

    #[error("Request rejected with status {status}: {body}")]
    BadRequest { status: u16, body: ErrorBody },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// No response was received at all.
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request gate refused to send the request because there is no usable session.
    #[error("Not authenticated - please log in")]
    NotAuthenticated,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let status = status.as_u16();
        match status {
            401 => ApiError::Unauthorized(ErrorBody::parse(body)),
            403 => ApiError::AccessDenied(ErrorBody::parse(body)),
            404 => ApiError::NotFound(ErrorBody::parse(body)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError {
                status,
                message: ErrorBody::parse(body).to_string(),
            },
            _ => ApiError::BadRequest {
                status,
                body: ErrorBody::parse(body),
            },
        }
    }

    /// HTTP status, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::AccessDenied(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::BadRequest { status, .. } => Some(*status),
            ApiError::RateLimited => Some(429),
            ApiError::ServerError { status, .. } => Some(*status),
            ApiError::NetworkError(_)
            | ApiError::InvalidResponse(_)
            | ApiError::InvalidRequest(_)
            | ApiError::NotAuthenticated => None,
        }
    }

    pub fn body(&self) -> Option<&ErrorBody> {
        match self {
            ApiError::Unauthorized(body)
            | ApiError::AccessDenied(body)
            | ApiError::NotFound(body)
            | ApiError::BadRequest { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Whether this failure means the credential itself was rejected
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_) | ApiError::NotAuthenticated)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::NetworkError(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status, "")
        } else {
            ApiError::NetworkError(err.to_string())
        }
    }
}
