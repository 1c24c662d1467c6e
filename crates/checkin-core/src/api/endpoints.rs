//! Endpoint paths, relative to the configured API base URL.

pub const LOGIN: &str = "/auth/login";
pub const REFRESH: &str = "/auth/refresh";
pub const LOGOUT: &str = "/auth/logout";
pub const PASSWORD_FORGOT: &str = "/auth/password/forgot";
pub const PASSWORD_RESET: &str = "/auth/password/reset";
pub const PROFILE: &str = "/users/me";

/// Endpoints that never carry a bearer token.
pub const PUBLIC: &[&str] = &[LOGIN, REFRESH, PASSWORD_FORGOT, PASSWORD_RESET];

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
