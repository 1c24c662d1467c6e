//! Data models exchanged with the check-in backend.
//!
//! - `Credentials`: login form input
//! - `TokenGrant`: tokens and lifetimes returned by login and refresh
//! - `UserProfile`: the opaque profile record of the signed-in user

pub mod grant;
pub mod user;

pub use grant::{Credentials, TokenGrant};
pub use user::UserProfile;
