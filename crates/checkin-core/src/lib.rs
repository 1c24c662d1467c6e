//! Core library for the check-in client.
//!
//! The interesting part of this crate is the session token lifecycle:
//! issuing, persisting, proactively refreshing and injecting the bearer
//! credential on every outbound API call.
//!
//! Components are built leaf-first and wired together by hand:
//!
//! - [`auth::SessionStore`]: durable snapshot storage
//! - [`auth::clock`]: expiry predicates
//! - [`auth::SessionState`]: the in-memory session, sole writer of store and bearer
//! - [`auth::RefreshCoordinator`]: single-flight token refresh
//! - [`api::RequestGate`] / [`api::ApiClient`]: per-request authentication
//! - [`auth::SessionManager`]: the facade screens talk to

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, ApiError, AuthTransport, HttpAuthTransport, RequestGate};
pub use auth::{
    AuthError, RefreshCoordinator, SessionManager, SessionSnapshot, SessionState, SessionStatus,
    SessionStore,
};
pub use config::Config;
pub use models::{Credentials, TokenGrant, UserProfile};
