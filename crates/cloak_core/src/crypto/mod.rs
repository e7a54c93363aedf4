//! Keyrings and payload framing.
//!
//! A keyring owns one stream: its id names the stream and its key seals
//! every entry the stream carries. The remote authority only ever sees
//! sealed blobs.
//!
//! ## Security Model
//!
//! - AES-256-GCM with a random 96-bit nonce per encryption
//! - The keyring id is bound as associated data, so a blob sealed for one
//!   stream does not open under another
//! - Keys are zeroized on drop
//! - Plaintexts are padded to a block multiple before sealing
//!
//! ```
//! use cloak_core::crypto::{pad, unpad, Keyring, SecretKeyring};
//!
//! let keyring = SecretKeyring::generate();
//! let blob = keyring.encrypt(&pad(b"hello", 64))?;
//! assert_eq!(unpad(&keyring.decrypt(&blob)?)?, b"hello");
//! # Ok::<(), cloak_core::CoreError>(())
//! ```

mod keyring;
mod padding;

pub use keyring::{SecretKeyring, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use padding::{pad, unpad};

use crate::error::CoreResult;

/// Seals and opens the entries of one stream.
pub trait Keyring {
    /// Returns the stream id this keyring owns.
    fn id(&self) -> &str;

    /// Encrypts a plaintext.
    fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>>;

    /// Decrypts a blob produced by [`Keyring::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecryptionFailed`](crate::CoreError::DecryptionFailed)
    /// for a wrong key, a different stream, or a corrupted blob.
    fn decrypt(&self, blob: &[u8]) -> CoreResult<Vec<u8>>;
}

impl<K: Keyring + ?Sized> Keyring for std::sync::Arc<K> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, blob: &[u8]) -> CoreResult<Vec<u8>> {
        (**self).decrypt(blob)
    }
}
