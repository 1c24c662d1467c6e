//! Expiry arithmetic for issued tokens.
//!
//! Everything here is pure: the `*_at` variants take the current instant
//! explicitly, the plain variants read `Utc::now()`. The client is the only
//! source of truth for expiry bookkeeping and no clock-skew correction is
//! attempted; a server-side rejection is handled by the request gate instead.

use chrono::{DateTime, Duration, Utc};

/// Buffer used by passive status checks (5 minutes).
pub const PASSIVE_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Buffer used by the request gate before attaching a token (2 minutes).
/// Tighter than the passive buffer so a refresh started by the gate can
/// finish before the server would reject the old token.
pub const GATE_REFRESH_BUFFER_MINUTES: i64 = 2;

/// Absolute expiry for a token issued now with the given lifetime.
pub fn expires_at(lifetime_secs: i64) -> DateTime<Utc> {
    expires_at_from(Utc::now(), lifetime_secs)
}

pub fn expires_at_from(issued_at: DateTime<Utc>, lifetime_secs: i64) -> DateTime<Utc> {
    issued_at + Duration::seconds(lifetime_secs.max(0))
}

/// True if there is no expiry or it has passed.
pub fn is_expired(expires_at: Option<DateTime<Utc>>) -> bool {
    is_expired_at(expires_at, Utc::now())
}

pub fn is_expired_at(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expiry) => now >= expiry,
        None => true,
    }
}

/// True if there is no expiry or it falls within `buffer` of now.
pub fn is_expiring_soon(expires_at: Option<DateTime<Utc>>, buffer: Duration) -> bool {
    is_expiring_soon_at(expires_at, buffer, Utc::now())
}

pub fn is_expiring_soon_at(
    expires_at: Option<DateTime<Utc>>,
    buffer: Duration,
    now: DateTime<Utc>,
) -> bool {
    match expires_at {
        Some(expiry) => now >= expiry - buffer,
        None => true,
    }
}

/// Time left before expiry, clamped to zero.
pub fn time_until_expiry(expires_at: Option<DateTime<Utc>>) -> Duration {
    match expires_at {
        Some(expiry) => (expiry - Utc::now()).max(Duration::zero()),
        None => Duration::zero(),
    }
}

/// Minutes remaining until expiry (for display)
pub fn minutes_until_expiry(expires_at: Option<DateTime<Utc>>) -> i64 {
    time_until_expiry(expires_at).num_minutes()
}
