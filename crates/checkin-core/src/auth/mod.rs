//! Session token lifecycle.
//!
//! This module provides:
//! - `clock`: expiry predicates over client-computed instants
//! - `SessionStore`: durable snapshot storage (plain, sealed, in-memory)
//! - `SessionState`: the authoritative in-memory session
//! - `RefreshCoordinator`: single-flight refresh shared by concurrent callers
//! - `SessionManager`: login/logout facade for screens
//! - `RememberedPasswords`: sign-in passwords kept in the OS keychain

pub mod clock;
pub mod error;
pub mod keychain;
mod legacy_messages;
pub mod manager;
pub mod refresh;
pub mod session;
pub mod state;
pub mod store;

pub use error::AuthError;
pub use keychain::RememberedPasswords;
pub use manager::SessionManager;
pub use refresh::RefreshCoordinator;
pub use session::{IssuedToken, Session, SessionSnapshot, SessionStatus};
pub use state::SessionState;
pub use store::{FileSessionStore, MemorySessionStore, SealedFileStore, SessionStore};
