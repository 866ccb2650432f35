//! Session encryption with AES-256-GCM
//!
//! One symmetric key per device, kept in the storage key slot (base64),
//! created on first use and reused afterwards.
//!
//! Envelope: `{ "iv": base64(nonce_12bytes), "ciphertext": base64(ciphertext || tag_16bytes) }`

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::storage::{LocalStorage, StorageError};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key")]
    InvalidKey,

    #[error("Encryption failed")]
    Encrypt,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Encrypted session blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherEnvelope {
    pub iv: String,
    pub ciphertext: String,
}

/// Session key (32 bytes for AES-256-GCM)
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; KEY_LEN],
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl SessionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut key);
        Self { key }
    }

    /// Import an exported key, `None` if it is not a valid key
    pub fn import(exported: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(exported).ok()?;
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .ok()?;
        if bytes.len() != KEY_LEN {
            bytes.zeroize();
            return None;
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Some(Self { key })
    }

    /// Export to the storable form (base64)
    pub fn export(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key)
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::InvalidKey)
    }
}

/// Serialize `value` to JSON and encrypt it with a fresh nonce
pub fn encrypt<T: Serialize>(key: &SessionKey, value: &T) -> Result<CipherEnvelope, CryptoError> {
    let plaintext = serde_json::to_vec(value)?;
    let cipher = key.cipher()?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| CryptoError::Encrypt)?;

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(CipherEnvelope {
        iv: b64.encode(nonce_bytes),
        ciphertext: b64.encode(ciphertext),
    })
}

/// Decrypt an envelope back into `T`
///
/// Returns `None` on any corruption (bad base64, wrong key, tampered data,
/// unexpected JSON) so the caller can fall back.
pub fn decrypt<T: DeserializeOwned>(key: &SessionKey, envelope: &CipherEnvelope) -> Option<T> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let nonce_bytes = b64.decode(&envelope.iv).ok()?;
    let ciphertext = b64.decode(&envelope.ciphertext).ok()?;
    if nonce_bytes.len() != NONCE_LEN || ciphertext.len() < TAG_LEN {
        return None;
    }

    let cipher = key.cipher().ok()?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .ok()?;

    serde_json::from_slice(&plaintext).ok()
}

/// Owns the global key slot
pub struct KeyManager {
    storage: LocalStorage,
}

impl KeyManager {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    /// Return the persisted key, or generate + persist a new one
    ///
    /// A slot holding something that cannot be imported is overwritten.
    pub fn get_or_create_key(&self) -> Result<SessionKey, StorageError> {
        if let Some(material) = self.storage.load_key_material()? {
            if let Some(key) = SessionKey::import(&material) {
                return Ok(key);
            }
            tracing::warn!("Stored session key is not importable, generating a new one");
        }

        let key = SessionKey::generate();
        self.storage.store_key_material(key.export().as_bytes())?;
        tracing::info!("Session encryption key created");
        Ok(key)
    }
}
