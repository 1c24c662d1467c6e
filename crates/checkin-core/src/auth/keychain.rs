//! OS keychain access via `keyring`.
//!
//! Holds two kinds of secrets: passwords the user asked to remember for the
//! next sign-in, and the key that seals the persisted session.

use anyhow::{bail, Context, Result};
use keyring::Entry;
use rand::RngCore;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "checkin-client";

/// Keychain account under which the session sealing key is stored
const SEALING_KEY_ACCOUNT: &str = "session-sealing-key";

fn entry(account: &str) -> Result<Entry> {
    Entry::new(SERVICE_NAME, account)
        .with_context(|| format!("Failed to open keychain entry for {}", account))
}

/// Sign-in passwords kept in the keychain, keyed by email address.
pub struct RememberedPasswords;

impl RememberedPasswords {
    pub fn remember(email: &str, password: &str) -> Result<()> {
        entry(email)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// The remembered password, if any. Keychain failures read as "none".
    pub fn recall(email: &str) -> Option<String> {
        let entry = match entry(email) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Keychain unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(password) => Some(password),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read remembered password");
                None
            }
        }
    }

    /// Drop the remembered password. Returns false if there was none.
    pub fn forget(email: &str) -> Result<bool> {
        match entry(email)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e).context("Failed to delete password from keychain"),
        }
    }
}

fn read_sealing_key(entry: &Entry) -> Result<Option<[u8; 32]>> {
    match entry.get_secret() {
        Ok(secret) => match <[u8; 32]>::try_from(secret.as_slice()) {
            Ok(key) => Ok(Some(key)),
            Err(_) => {
                info!(len = secret.len(), "Discarding malformed sealing key");
                Ok(None)
            }
        },
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e).context("Failed to read sealing key from keychain"),
    }
}

/// Fetch the 256-bit session sealing key, generating and storing one on first use.
///
/// A freshly generated key is only returned once a new entry reads it back,
/// so a backend that keeps nothing across entries is an error.
pub fn load_or_create_sealing_key() -> Result<[u8; 32]> {
    if let Some(key) = read_sealing_key(&entry(SEALING_KEY_ACCOUNT)?)? {
        debug!("Loaded session sealing key from keychain");
        return Ok(key);
    }

    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    entry(SEALING_KEY_ACCOUNT)?
        .set_secret(&key)
        .context("Failed to store sealing key in keychain")?;

    match read_sealing_key(&entry(SEALING_KEY_ACCOUNT)?)? {
        Some(stored) if stored == key => {
            info!("Generated new session sealing key");
            Ok(key)
        }
        _ => bail!("Keychain did not keep the session sealing key"),
    }
}
