//! REST API plumbing for the check-in backend.
//!
//! - `AuthTransport` / `HttpAuthTransport`: the login, refresh and logout calls
//! - `RequestGate`: decides per request whether a bearer token is needed,
//!   triggers refresh, and reacts to server-side rejections
//! - `ApiClient`: JSON client that routes every call through the gate

pub mod client;
pub mod endpoints;
pub mod error;
pub mod gate;
pub mod transport;

pub use client::{ApiClient, ApiRequest};
pub use error::{ApiError, ErrorBody};
pub use gate::{Authorization, RequestGate};
pub use transport::{AuthTransport, HttpAuthTransport};
