//! Pluggable RTM token persistence (SPEC_FULL §4.7).
//!
//! Three interchangeable backends behind one capability set, grounded on
//! the teacher's `mcp/auth/token_store.rs` keyring usage and on
//! `scrappyAI-Toka`'s `toka-security-vault` for the AES-GCM file backend.
//! Selection precedence (keychain, then encrypted file, then none) lives
//! in [`select_token_store`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::Engine as _;
use aes_gcm::aead::rand_core::RngCore as _;
use aes_gcm::aead::OsRng;
use sha2::{Digest, Sha256};

use crate::config::RtmConfig;
use crate::error::{AuthError, Result};

/// The fixed keychain service name for every CowGnition installation.
const KEYCHAIN_SERVICE: &str = "CowGnitionRTM";

/// A single capability set shared by all three backends (SPEC_FULL §4.7).
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist `token`, replacing any previously stored value.
    async fn save(&self, token: &str) -> Result<()>;
    /// Retrieve the stored token, if any.
    async fn load(&self) -> Result<Option<String>>;
    /// Remove the stored token. A no-op when nothing is stored.
    async fn delete(&self) -> Result<()>;
    /// Whether a token is currently stored.
    async fn has(&self) -> Result<bool> {
        Ok(self.load().await?.is_some())
    }
    /// Whether this backend can be used at all, verified with a live
    /// round-trip self-test (save -> load -> compare -> delete) rather than
    /// a static capability check.
    async fn is_available(&self) -> bool;
}

/// Which backend ended up selected, and where it keeps its data, so a
/// setup CLI can report it honestly (SPEC_FULL §4.7, §10.5).
#[derive(Debug, Clone)]
pub struct TokenStorageInfo {
    /// `"secure"`, `"file"`, or `"none"`.
    pub backend: String,
    /// Keychain service/user pair, file path, or an explanatory string.
    pub location: String,
}

fn derive_username(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        hex.push_str(&format!("{byte:02x}"));
    }
    format!("rtm-{hex}")
}

// ---------------------------------------------------------------------------
// Keychain backend
// ---------------------------------------------------------------------------

/// OS-native credential store backend.
pub struct KeychainStore {
    user: String,
}

impl KeychainStore {
    /// Build a keychain-backed store for the given RTM API key.
    pub fn new(api_key: &str) -> Self {
        Self {
            user: derive_username(api_key),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYCHAIN_SERVICE, &self.user)
            .map_err(AuthError::Keyring)
            .map_err(Into::into)
    }

    fn location(&self) -> String {
        format!("{KEYCHAIN_SERVICE}/{}", self.user)
    }
}

#[async_trait]
impl TokenStore for KeychainStore {
    async fn save(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .map_err(AuthError::Keyring)
            .map_err(Into::into)
    }

    async fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Keyring(e).into()),
        }
    }

    async fn delete(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::Keyring(e).into()),
        }
    }

    async fn is_available(&self) -> bool {
        const PROBE: &str = "cowgnition-probe";
        let save_ok = self.save(PROBE).await.is_ok();
        if !save_ok {
            tracing::debug!(backend = "secure", op = "save", ok = false, "keychain self-test failed");
            return false;
        }
        let round_trips = matches!(self.load().await, Ok(Some(v)) if v == PROBE);
        let _ = self.delete().await;
        tracing::debug!(backend = "secure", op = "round_trip", ok = round_trips, "keychain self-test");
        round_trips
    }
}

// ---------------------------------------------------------------------------
// Encrypted file backend
// ---------------------------------------------------------------------------

/// AES-GCM encrypted file backend, used when the OS keychain is unavailable.
pub struct EncryptedFileStore {
    path: PathBuf,
    cipher: Aes256Gcm,
}

impl EncryptedFileStore {
    /// Build a file-backed store rooted at `path`, deriving its key from
    /// the hostname, OS user, and the path itself (SPEC_FULL §4.7: the key
    /// must be reconstructible without a separate keystore).
    pub fn new(path: PathBuf) -> Result<Self> {
        let key_material = Self::derive_key(&path);
        let cipher = Aes256Gcm::new_from_slice(&key_material)
            .map_err(|e| AuthError::StorageUnavailable(format!("key derivation failed: {e}")))?;
        Ok(Self { path, cipher })
    }

    fn derive_key(path: &Path) -> [u8; 32] {
        let hostname = platform_hostname();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(hostname.as_bytes());
        hasher.update(user.as_bytes());
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.finalize().into()
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
                    .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AuthError::StorageUnavailable(format!("encryption failed: {e}")))?;
        let mut blob = Vec::with_capacity(12 + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(blob))
    }

    fn decrypt(&self, encoded: &str) -> Result<String> {
        let blob = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::StorageUnavailable(format!("corrupt token file: {e}")))?;
        if blob.len() < 12 {
            return Err(AuthError::StorageUnavailable("corrupt token file: too short".to_string()).into());
        }
        let (nonce_bytes, ciphertext) = blob.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AuthError::StorageUnavailable(format!("decryption failed: {e}")))?;
        String::from_utf8(plaintext)
            .map_err(|e| AuthError::StorageUnavailable(format!("corrupt token file: {e}")).into())
    }
}

#[async_trait]
impl TokenStore for EncryptedFileStore {
    async fn save(&self, token: &str) -> Result<()> {
        self.ensure_parent_dir()?;
        let encoded = self.encrypt(token)?;
        std::fs::write(&self.path, encoded).map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(self.decrypt(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::StorageUnavailable(e.to_string()).into()),
        }
    }

    async fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::StorageUnavailable(e.to_string()).into()),
        }
    }

    async fn is_available(&self) -> bool {
        if self.ensure_parent_dir().is_err() {
            return false;
        }
        const PROBE: &str = "cowgnition-probe";
        let round_trips = self.save(PROBE).await.is_ok()
            && matches!(self.load().await, Ok(Some(v)) if v == PROBE);
        let _ = self.delete().await;
        round_trips
    }
}

#[cfg(unix)]
fn platform_hostname() -> String {
    let mut buf = vec![0u8; 256];
    let result = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if result != 0 {
        return "unknown-host".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(not(unix))]
fn platform_hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

// ---------------------------------------------------------------------------
// None backend
// ---------------------------------------------------------------------------

/// No-op backend used when neither keychain nor file storage is usable.
/// Every call succeeds but nothing persists across process restarts.
pub struct NoneStore;

#[async_trait]
impl TokenStore for NoneStore {
    async fn save(&self, _token: &str) -> Result<()> {
        tracing::warn!("token storage unavailable; authentication will not persist across sessions");
        Ok(())
    }

    async fn load(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn delete(&self) -> Result<()> {
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Default path for the encrypted-file backend when no override is given.
fn default_file_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "cowgnition", "cowgnition")
        .map(|dirs| dirs.data_dir().join("rtm_token.enc"))
        .unwrap_or_else(|| PathBuf::from(".cowgnition/rtm_token.enc"))
}

/// Select a token store for `rtm_config`, trying the OS keychain first,
/// then an encrypted file, then falling back to the no-op backend
/// (SPEC_FULL §4.7 selection precedence).
pub async fn select_token_store(rtm_config: &RtmConfig) -> (Arc<dyn TokenStore>, TokenStorageInfo) {
    let keychain = KeychainStore::new(&rtm_config.api_key);
    if keychain.is_available().await {
        let info = TokenStorageInfo {
            backend: "secure".to_string(),
            location: keychain.location(),
        };
        return (Arc::new(keychain), info);
    }

    let file_path = default_file_path();
    if let Ok(file_store) = EncryptedFileStore::new(file_path.clone()) {
        if file_store.is_available().await {
            let info = TokenStorageInfo {
                backend: "file".to_string(),
                location: file_path.display().to_string(),
            };
            return (Arc::new(file_store), info);
        }
    }

    tracing::warn!("no persistent token storage backend is usable; falling back to in-memory-only storage");
    (
        Arc::new(NoneStore),
        TokenStorageInfo {
            backend: "none".to_string(),
            location: "not persisted".to_string(),
        },
    )
}
