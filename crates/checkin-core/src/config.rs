//! Application configuration management.
//!
//! Holds the API endpoint, request timeout, token refresh policy, and the
//! session storage backend. Stored at `~/.config/checkin/config.json`;
//! `CHECKIN_API_URL` and `CHECKIN_SESSION_BACKEND` override the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::clock::{GATE_REFRESH_BUFFER_MINUTES, PASSIVE_REFRESH_BUFFER_MINUTES};
use crate::auth::keychain;
use crate::auth::store::{FileSessionStore, SealedFileStore, SessionStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "checkin";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_API_URL: &str = "CHECKIN_API_URL";
const ENV_SESSION_BACKEND: &str = "CHECKIN_SESSION_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Encrypted file, key kept in the OS keychain
    #[default]
    Sealed,
    /// Plain JSON file, for platforms without a keychain
    File,
}

impl std::str::FromStr for SessionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sealed" => Ok(SessionBackend::Sealed),
            "file" => Ok(SessionBackend::File),
            other => Err(anyhow::anyhow!("Unknown session backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Refresh window the request gate applies before attaching a token.
    pub gate_refresh_buffer_minutes: i64,
    /// Refresh window for passive status checks.
    pub passive_refresh_buffer_minutes: i64,
    /// Roles allowed to use this client. Empty means any role.
    pub required_roles: Vec<String>,
    pub session_backend: SessionBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            gate_refresh_buffer_minutes: GATE_REFRESH_BUFFER_MINUTES,
            passive_refresh_buffer_minutes: PASSIVE_REFRESH_BUFFER_MINUTES,
            required_roles: vec!["organizer".to_string(), "admin".to_string()],
            session_backend: SessionBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from disk (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        debug!(api_base_url = %config.api_base_url, backend = ?config.session_backend, "Config loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Ok(backend) = std::env::var(ENV_SESSION_BACKEND) {
            match backend.parse() {
                Ok(backend) => self.session_backend = backend,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_SESSION_BACKEND),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session and log files
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn gate_buffer(&self) -> Duration {
        Duration::minutes(self.gate_refresh_buffer_minutes.max(0))
    }

    pub fn passive_buffer(&self) -> Duration {
        Duration::minutes(self.passive_refresh_buffer_minutes.max(0))
    }

    /// Whether a profile role may use this client
    pub fn role_allowed(&self, role: Option<&str>) -> bool {
        if self.required_roles.is_empty() {
            return true;
        }
        role.is_some_and(|role| {
            self.required_roles
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(role))
        })
    }

    /// Open the configured session store in the data directory.
    pub fn open_session_store(&self) -> Result<Arc<dyn SessionStore>> {
        let data_dir = self.data_dir()?;
        Ok(open_session_store_in(
            &data_dir,
            self.session_backend,
            keychain::load_or_create_sealing_key,
        ))
    }
}

/// Open a session store in `data_dir`.
///
/// The sealed backend needs a key from `sealing_key`; when none can be had
/// the session goes to the plain file store instead.
pub fn open_session_store_in(
    data_dir: &Path,
    backend: SessionBackend,
    sealing_key: impl FnOnce() -> Result<[u8; 32]>,
) -> Arc<dyn SessionStore> {
    match backend {
        SessionBackend::Sealed => match sealing_key() {
            Ok(key) => Arc::new(SealedFileStore::new(data_dir, &key)),
            Err(e) => {
                warn!(error = %e, "Keychain unavailable, storing session unsealed");
                Arc::new(FileSessionStore::new(data_dir))
            }
        },
        SessionBackend::File => Arc::new(FileSessionStore::new(data_dir)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{SEALED_SESSION_FILE, SESSION_FILE};
    use crate::auth::SessionState;
    use crate::test_support::{grant, MockTransport};
    use tempfile::TempDir;

    fn signed_in_state(store: Arc<dyn SessionStore>) -> SessionState {
        let state = SessionState::new(store, Arc::new(MockTransport::new()));
        state.apply_login_result(grant("a1", 3600, 86400));
        state
    }

    #[test]
    fn test_sealed_session_survives_restart() {
        let dir = TempDir::new().unwrap();
        let key = [7u8; 32];

        let first = open_session_store_in(dir.path(), SessionBackend::Sealed, || Ok(key));
        signed_in_state(first);
        assert!(dir.path().join(SEALED_SESSION_FILE).exists());
        assert!(!dir.path().join(SESSION_FILE).exists());

        // Next run derives the same key from the keychain
        let second = open_session_store_in(dir.path(), SessionBackend::Sealed, || Ok(key));
        let restored = SessionState::new(second, Arc::new(MockTransport::new()));
        assert!(restored.restore());
        assert_eq!(restored.access_token().as_deref(), Some("a1"));
    }

    #[test]
    fn test_missing_keychain_falls_back_to_file_store() {
        let dir = TempDir::new().unwrap();

        let store = open_session_store_in(dir.path(), SessionBackend::Sealed, || {
            Err(anyhow::anyhow!("no keychain"))
        });
        signed_in_state(store);
        assert!(dir.path().join(SESSION_FILE).exists());
        assert!(!dir.path().join(SEALED_SESSION_FILE).exists());

        let again = open_session_store_in(dir.path(), SessionBackend::Sealed, || {
            Err(anyhow::anyhow!("no keychain"))
        });
        let restored = SessionState::new(again, Arc::new(MockTransport::new()));
        assert!(restored.restore());
        assert_eq!(restored.access_token().as_deref(), Some("a1"));
    }

    #[test]
    fn test_file_backend_never_asks_for_a_key() {
        let dir = TempDir::new().unwrap();
        let store = open_session_store_in(dir.path(), SessionBackend::File, || {
            panic!("file backend needs no key")
        });
        signed_in_state(store);
        assert!(dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gate_buffer(), Duration::minutes(2));
        assert_eq!(config.passive_buffer(), Duration::minutes(5));
        assert_eq!(config.session_backend, SessionBackend::Sealed);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "https://api.test", "session_backend": "file"}"#).unwrap();
        assert_eq!(config.api_base_url, "https://api.test");
        assert_eq!(config.session_backend, SessionBackend::File);
        assert_eq!(config.gate_refresh_buffer_minutes, 2);
        assert_eq!(config.passive_refresh_buffer_minutes, 5);
    }

    #[test]
    fn test_role_allowed() {
        let config = Config::default();
        assert!(config.role_allowed(Some("organizer")));
        assert!(config.role_allowed(Some("Admin")));
        assert!(!config.role_allowed(Some("attendee")));
        assert!(!config.role_allowed(None));

        let open = Config {
            required_roles: Vec::new(),
            ..Config::default()
        };
        assert!(open.role_allowed(None));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("sealed".parse::<SessionBackend>().unwrap(), SessionBackend::Sealed);
        assert_eq!(" FILE ".parse::<SessionBackend>().unwrap(), SessionBackend::File);
        assert!("sqlite".parse::<SessionBackend>().is_err());
    }
}
