//! Cookie file persistence.
//!
//! Signed-in sessions are written to `~/.cookies` as a JSON list of
//! [`CookieTray`]s. When a key is configured the JSON is sealed with
//! XChaCha20-Poly1305 before it reaches the disk.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use super::CookieTray;
use crate::constants::COOKIE_FILE_NAME;

/// Environment variable holding cookie encryption key material.
pub const COOKIE_KEY_ENV: &str = "AEREMOTE_COOKIE_KEY";

const KEYRING_SERVICE: &str = "aeremote";
const KEYRING_ENTRY_NAME: &str = "cookie-master-key-v1";
const MAGIC: &[u8; 4] = b"AER1";
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const FORMAT_VERSION: u32 = 1;

/// Errors for cookie file operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No home directory is available to hold the cookie file.
    #[error("unable to determine home directory (set HOME)")]
    HomeDirUnavailable,
    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Serialization/deserialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The file was written by an incompatible format version.
    #[error("unsupported cookie file version {0}")]
    UnsupportedVersion(u32),
    /// Could not access keychain for the encryption key.
    #[error(
        "unable to access system keychain for cookie encryption key; set AEREMOTE_COOKIE_KEY or configure keychain access"
    )]
    KeychainUnavailable,
    /// The file is sealed but no key is configured.
    #[error("cookie file is encrypted but no key is configured; set AEREMOTE_COOKIE_KEY")]
    KeyRequired,
    /// Stored encrypted payload is malformed.
    #[error("persisted cookie payload is invalid")]
    InvalidPayload,
    /// Encryption failed.
    #[error("failed to encrypt persisted cookies")]
    EncryptionFailed,
    /// Decryption failed.
    #[error("failed to decrypt persisted cookies")]
    DecryptionFailed,
}

/// How the cookie file is protected at rest.
#[derive(Clone, Default)]
pub enum CookieProtection {
    /// Plain JSON, owner-only file permissions.
    #[default]
    Plain,
    /// Sealed with key material supplied by the caller or environment.
    Sealed(String),
    /// Sealed with key material held in the system keychain.
    Keychain(String),
}

impl CookieProtection {
    /// Resolves protection from `AEREMOTE_COOKIE_KEY`, falling back to the
    /// keychain when `use_keychain` is set, else plain.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeychainUnavailable`] when the keychain is requested
    /// but cannot be read or written.
    pub fn resolve(use_keychain: bool) -> Result<Self, StorageError> {
        if let Some(from_env) = env::var_os(COOKIE_KEY_ENV) {
            let key = from_env.to_string_lossy().trim().to_string();
            if !key.is_empty() {
                return Ok(Self::Sealed(key));
            }
        }

        if use_keychain {
            return Ok(Self::Keychain(load_or_create_keychain_key()?));
        }

        Ok(Self::Plain)
    }

    fn key_material(&self) -> Option<&str> {
        match self {
            Self::Plain => None,
            Self::Sealed(key) | Self::Keychain(key) => Some(key),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Sealed(_) => "sealed",
            Self::Keychain(_) => "keychain",
        }
    }
}

// Key material is never printed.
impl fmt::Debug for CookieProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CookieFile {
    version: u32,
    trays: Vec<CookieTray>,
}

/// The cookie file at a fixed path.
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
    protection: CookieProtection,
}

impl CookieStore {
    /// Creates a store for `path` with the given protection.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, protection: CookieProtection) -> Self {
        Self {
            path: path.into(),
            protection,
        }
    }

    /// Path of the cookie file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the cookie file with `trays`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when encryption or file writing fails.
    #[instrument(level = "debug", skip(self, trays), fields(path = %self.path.display()))]
    pub fn save(&self, trays: &[CookieTray]) -> Result<(), StorageError> {
        let document = CookieFile {
            version: FORMAT_VERSION,
            trays: trays.to_vec(),
        };
        let plaintext = serde_json::to_vec_pretty(&document)?;
        let payload = match self.protection.key_material() {
            Some(key_material) => encrypt_bytes(&plaintext, key_material)?,
            None => plaintext,
        };

        write_owner_only(&self.path, &payload)?;
        debug!(
            trays = trays.len(),
            protection = self.protection.label(),
            "wrote cookie file"
        );
        Ok(())
    }

    /// Reads the cookie file.
    ///
    /// A missing file yields an empty list. Any other failure is returned so the
    /// caller can decide to continue without stored cookies.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the file cannot be read, decrypted, or decoded.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Vec<CookieTray>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("no cookie file");
                return Ok(Vec::new());
            }
            Err(error) => return Err(error.into()),
        };

        let plaintext = if bytes.starts_with(MAGIC) {
            let key_material = self
                .protection
                .key_material()
                .ok_or(StorageError::KeyRequired)?;
            decrypt_bytes(&bytes, key_material)?
        } else {
            bytes
        };

        let document = serde_json::from_slice::<CookieFile>(&plaintext)?;
        if document.version != FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion(document.version));
        }
        debug!(trays = document.trays.len(), "read cookie file");
        Ok(document.trays)
    }

    /// Deletes the cookie file.
    ///
    /// Returns `true` when the file existed and was deleted. A keychain-held key
    /// is removed on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when file removal fails.
    pub fn clear(&self) -> Result<bool, StorageError> {
        let removed = match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(error) if error.kind() == io::ErrorKind::NotFound => false,
            Err(error) => return Err(error.into()),
        };

        if matches!(self.protection, CookieProtection::Keychain(_)) {
            let _ = delete_keychain_key();
        }

        if removed {
            info!(path = %self.path.display(), "removed cookie file");
        }
        Ok(removed)
    }
}

/// Returns the default cookie file path (`~/.cookies`).
///
/// # Errors
///
/// Returns [`StorageError::HomeDirUnavailable`] if no usable home dir is found.
pub fn default_cookie_path() -> Result<PathBuf, StorageError> {
    Ok(resolve_home_dir(
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("USERPROFILE")),
    )?
    .join(COOKIE_FILE_NAME))
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_home_dir(
    home: Option<PathBuf>,
    user_profile: Option<PathBuf>,
) -> Result<PathBuf, StorageError> {
    home.or(user_profile)
        .ok_or(StorageError::HomeDirUnavailable)
}

fn write_owner_only(path: &Path, payload: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut file = owner_only_open_options().open(path)?;
    // The creation mode does not apply to a file that already exists.
    set_owner_only_permissions(&file)?;
    file.write_all(payload)?;
    Ok(())
}

fn owner_only_open_options() -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

#[cfg(unix)]
fn set_owner_only_permissions(file: &fs::File) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_file: &fs::File) -> Result<(), StorageError> {
    Ok(())
}

fn load_or_create_keychain_key() -> Result<String, StorageError> {
    let entry = safe_keyring_entry()?;

    match safe_keyring_get_password(&entry) {
        Ok(existing) if !existing.trim().is_empty() => Ok(existing),
        _ => {
            let generated = generate_key_material();
            safe_keyring_set_password(&entry, &generated)?;
            Ok(generated)
        }
    }
}

fn delete_keychain_key() -> Result<(), StorageError> {
    let entry = safe_keyring_entry()?;
    catch_unwind(AssertUnwindSafe(|| entry.delete_credential()))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)
}

// Some keyring backends panic when no secret service is reachable.
fn safe_keyring_entry() -> Result<keyring::Entry, StorageError> {
    catch_unwind(|| keyring::Entry::new(KEYRING_SERVICE, KEYRING_ENTRY_NAME))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)
}

fn safe_keyring_get_password(entry: &keyring::Entry) -> Result<String, StorageError> {
    catch_unwind(AssertUnwindSafe(|| entry.get_password()))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)
}

fn safe_keyring_set_password(entry: &keyring::Entry, password: &str) -> Result<(), StorageError> {
    catch_unwind(AssertUnwindSafe(|| entry.set_password(password)))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)
}

fn generate_key_material() -> String {
    let mut bytes = [0_u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn derive_key_bytes(key_material: &str) -> [u8; KEY_LEN] {
    let digest = Sha256::digest(key_material.as_bytes());
    let mut key = [0_u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    key
}

fn encrypt_bytes(plaintext: &[u8], key_material: &str) -> Result<Vec<u8>, StorageError> {
    let key_bytes = derive_key_bytes(key_material);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let mut nonce = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| StorageError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn decrypt_bytes(payload: &[u8], key_material: &str) -> Result<Vec<u8>, StorageError> {
    if payload.len() < MAGIC.len() + NONCE_LEN || &payload[..MAGIC.len()] != MAGIC {
        return Err(StorageError::InvalidPayload);
    }

    let key_bytes = derive_key_bytes(key_material);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));
    let nonce_end = MAGIC.len() + NONCE_LEN;
    let nonce = XNonce::from_slice(&payload[MAGIC.len()..nonce_end]);

    cipher
        .decrypt(nonce, &payload[nonce_end..])
        .map_err(|_| StorageError::DecryptionFailed)
}
