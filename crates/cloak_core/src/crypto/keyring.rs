//! AES-256-GCM keyring.

use super::Keyring;
use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const SEED_INFO: &[u8] = b"cloak-keyring-v1";

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct SecretKey([u8; KEY_SIZE]);

/// A keyring holding one symmetric key.
#[derive(Clone)]
pub struct SecretKeyring {
    id: String,
    key: SecretKey,
    cipher: Aes256Gcm,
}

impl SecretKeyring {
    /// Creates a keyring with a fresh UUID id and a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::with_key(Uuid::new_v4().to_string(), SecretKey(bytes))
    }

    /// Creates a keyring from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is not exactly 32 bytes.
    pub fn from_bytes(id: impl Into<String>, key: &[u8]) -> CoreResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(key.len(), KEY_SIZE));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(key);
        Ok(Self::with_key(id.into(), SecretKey(bytes)))
    }

    /// Derives a keyring from a high-entropy seed with HKDF-SHA256.
    ///
    /// The id is the HKDF salt, so every device holding the same `(id, seed)`
    /// pair derives the same key.
    pub fn from_seed(id: impl Into<String>, seed: &[u8]) -> CoreResult<Self> {
        let id = id.into();
        let hk = Hkdf::<Sha256>::new(Some(id.as_bytes()), seed);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(SEED_INFO, &mut bytes)
            .map_err(|_| CoreError::key_derivation_failed("HKDF expand failed"))?;
        Ok(Self::with_key(id, SecretKey(bytes)))
    }

    fn with_key(id: String, key: SecretKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&key.0));
        Self { id, key, cipher }
    }

    /// Returns the raw key.
    ///
    /// Do not log or persist the result unprotected.
    #[must_use]
    pub fn key_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key.0
    }
}

impl Keyring for SecretKeyring {
    fn id(&self) -> &str {
        &self.id
    }

    /// Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
    fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: self.id.as_bytes(),
        };
        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|_| CoreError::encryption_failed("encryption error"))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend(ciphertext);
        Ok(blob)
    }

    fn decrypt(&self, blob: &[u8]) -> CoreResult<Vec<u8>> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::decryption_failed("blob too short"));
        }
        let nonce = Nonce::from_slice(&blob[..NONCE_SIZE]);
        let payload = Payload {
            msg: &blob[NONCE_SIZE..],
            aad: self.id.as_bytes(),
        };
        self.cipher
            .decrypt(nonce, payload)
            .map_err(|_| CoreError::decryption_failed("authentication failed"))
    }
}

impl std::fmt::Debug for SecretKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKeyring")
            .field("id", &self.id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
