//! Password-derived key lifecycle and per-record authenticated
//! encryption.
//!
//! The key is derived from a user password with PBKDF2-HMAC-SHA256 over
//! a random salt. The salt is generated once, persisted next to (but
//! distinct from) the record collections, and reused thereafter, so the
//! same password always re-derives the same key. The key itself only
//! ever lives in memory and is wiped on `clear`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use reverie_core::error::{Result, ReverieError};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;
use zeroize::Zeroizing;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_FILE: &str = "cipher.salt";

/// Manages the symmetric key and performs authenticated
/// encryption/decryption of entry bodies.
///
/// # Thread safety
///
/// The key is replaced wholesale by `initialize_with_password`/`clear`
/// under the write lock, while `encrypt`/`decrypt` hold read locks, so
/// state transitions serialize against in-flight operations.
pub struct CipherManager {
    salt_path: PathBuf,
    key: RwLock<Option<Zeroizing<[u8; KEY_LEN]>>>,
}

impl CipherManager {
    /// Creates a manager persisting its salt under `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            salt_path: base_dir.as_ref().join(SALT_FILE),
            key: RwLock::new(None),
        }
    }

    /// Derives the in-memory key from `password`.
    ///
    /// Obtains the persisted salt, creating and storing a random one on
    /// first use, then runs PBKDF2-HMAC-SHA256 with 100,000 iterations.
    pub async fn initialize_with_password(&self, password: &str) -> Result<()> {
        let salt = self.load_or_create_salt().await?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut *key);

        let mut guard = self
            .key
            .write()
            .map_err(|_| ReverieError::internal("cipher key lock poisoned"))?;
        *guard = Some(key);
        tracing::debug!("cipher manager initialized");
        Ok(())
    }

    /// Encrypts `plaintext` with a fresh random 96-bit nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let guard = self
            .key
            .read()
            .map_err(|_| ReverieError::internal("cipher key lock poisoned"))?;
        let key = guard
            .as_ref()
            .ok_or(ReverieError::not_initialized("cipher"))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&**key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| ReverieError::internal(format!("encryption failed: {e:?}")))?;
        Ok((ciphertext, nonce.to_vec()))
    }

    /// Decrypts `ciphertext` under the stored key and the given nonce.
    ///
    /// Fails with a `Decryption` error on authentication-tag mismatch,
    /// which is the sole feedback mechanism for a wrong password or
    /// corrupted data.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        let guard = self
            .key
            .read()
            .map_err(|_| ReverieError::internal("cipher key lock poisoned"))?;
        let key = guard
            .as_ref()
            .ok_or(ReverieError::not_initialized("cipher"))?;

        if nonce.len() != NONCE_LEN {
            return Err(ReverieError::decryption(format!(
                "invalid nonce length: {}",
                nonce.len()
            )));
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&**key));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ReverieError::decryption("authentication tag mismatch"))
    }

    /// Discards the in-memory key; subsequent encrypt/decrypt calls
    /// fail with `NotInitialized`. The key bytes are zeroized on drop.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.key.write() {
            guard.take();
        }
        tracing::debug!("cipher manager cleared");
    }

    /// Pure query, no side effects.
    pub fn is_initialized(&self) -> bool {
        self.key
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Checks whether `password` derives the currently-held key,
    /// without replacing it.
    ///
    /// Used by bulk decryption flows to reject a wrong password before
    /// any entry is mutated.
    pub async fn matches_password(&self, password: &str) -> Result<bool> {
        let salt = self.load_or_create_salt().await?;
        let mut candidate = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut *candidate);

        let guard = self
            .key
            .read()
            .map_err(|_| ReverieError::internal("cipher key lock poisoned"))?;
        let key = guard
            .as_ref()
            .ok_or(ReverieError::not_initialized("cipher"))?;
        Ok(**key == *candidate)
    }

    /// Exports the raw key bytes for backup scenarios.
    pub fn export_key(&self) -> Result<[u8; KEY_LEN]> {
        let guard = self
            .key
            .read()
            .map_err(|_| ReverieError::internal("cipher key lock poisoned"))?;
        guard
            .as_ref()
            .map(|key| **key)
            .ok_or(ReverieError::not_initialized("cipher"))
    }

    /// Installs raw key bytes, replacing any derived key.
    pub fn import_key(&self, key: [u8; KEY_LEN]) -> Result<()> {
        let mut guard = self
            .key
            .write()
            .map_err(|_| ReverieError::internal("cipher key lock poisoned"))?;
        *guard = Some(Zeroizing::new(key));
        Ok(())
    }

    async fn load_or_create_salt(&self) -> Result<Vec<u8>> {
        match fs::read_to_string(&self.salt_path).await {
            Ok(encoded) => BASE64_STANDARD
                .decode(encoded.trim().as_bytes())
                .map_err(|e| ReverieError::internal(format!("corrupt salt file: {e}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let mut salt = vec![0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                if let Some(parent) = self.salt_path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(&self.salt_path, BASE64_STANDARD.encode(&salt)).await?;
                Ok(salt)
            }
            Err(err) => Err(err.into()),
        }
    }
}
