//! Durable storage for the session snapshot.
//!
//! Writes go to a sibling `.tmp` file that is then renamed over the target,
//! so a crash mid-save leaves either the old snapshot or the new one, never
//! a torn file that fails to parse.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use super::SessionSnapshot;

/// Session file name in the data directory
pub const SESSION_FILE: &str = "session.json";

/// Sealed session file name in the data directory
pub const SEALED_SESSION_FILE: &str = "session.bin";

/// ChaCha20-Poly1305 nonce length in bytes
const NONCE_LEN: usize = 12;

pub trait SessionStore: Send + Sync {
    /// Load the persisted snapshot, `None` if nothing has been saved.
    fn load(&self) -> Result<Option<SessionSnapshot>>;

    fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    /// Delete the persisted snapshot. Deleting a missing snapshot is not an error.
    fn delete(&self) -> Result<()>;
}

/// Plain JSON file store.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        let snapshot: SessionSnapshot = serde_json::from_str(&contents)
            .context("Failed to parse session file")?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let contents = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&self.path, contents.as_bytes())
    }

    fn delete(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

/// Encrypted file store. The file is `nonce || ciphertext` where the
/// plaintext is the same JSON the plain store writes.
pub struct SealedFileStore {
    path: PathBuf,
    cipher: ChaCha20Poly1305,
}

impl SealedFileStore {
    pub fn new(data_dir: &Path, key: &[u8; 32]) -> Self {
        Self {
            path: data_dir.join(SEALED_SESSION_FILE),
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for SealedFileStore {
    fn load(&self) -> Result<Option<SessionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let sealed = std::fs::read(&self.path).context("Failed to read sealed session file")?;
        if sealed.len() < NONCE_LEN {
            bail!("Sealed session file is truncated ({} bytes)", sealed.len());
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Failed to unseal session file (wrong key or corrupted data)"))?;
        let snapshot: SessionSnapshot = serde_json::from_slice(&plaintext)
            .context("Failed to parse unsealed session")?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let plaintext = serde_json::to_vec(snapshot)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| anyhow!("Failed to seal session"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        write_atomic(&self.path, &sealed)
    }

    fn delete(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

/// In-process store, for tests and sessions that should not outlive the process.
#[derive(Default)]
pub struct MemorySessionStore {
    snapshot: Mutex<Option<SessionSnapshot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    /// What is currently "on disk".
    pub fn stored(&self) -> Option<SessionSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionSnapshot>> {
        Ok(self.stored())
    }

    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        *self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some(snapshot.clone());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        *self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid session path: {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move session file into place at {}", path.display()))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
    }
}
