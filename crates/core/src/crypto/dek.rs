//! Data-encryption keys and authenticated encryption.
//!
//! Every stored payload is encrypted with a `Dek` under ChaCha20-Poly1305.
//! Decryption fails closed: a tag mismatch returns an error, never partial
//! plaintext. DEKs are owned by the header and are never derived from a
//! password directly.

use std::fmt;
use std::ops::Deref;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

/// Size of a data-encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;
/// Size of a ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of a Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Errors that can occur in the crypto primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Authentication failed: wrong key, or the data was tampered with
    #[error("authenticated decryption failed")]
    Auth,

    /// Key derivation failed
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// Input has the wrong length for the expected primitive
    #[error("invalid {what} length, expected {expected}, got {got}")]
    InvalidLength {
        /// What was being parsed
        what: &'static str,
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        got: usize,
    },

    /// Catch-all
    #[error("crypto error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A 256-bit symmetric data-encryption key.
///
/// Multiple DEKs may be valid at once: after a rotation the old key is
/// retained so objects encrypted under it by devices that have not rotated
/// yet can still be decrypted. Exactly one DEK is current for new writes.
#[derive(Clone, PartialEq, Eq)]
pub struct Dek([u8; KEY_SIZE]);

impl fmt::Debug for Dek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // key material must never reach logs
        f.write_str("Dek(..)")
    }
}

impl Deref for Dek {
    type Target = [u8; KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for Dek {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Dek(bytes)
    }
}

impl Dek {
    /// Generate a new random key using a cryptographically secure RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut buff = [0; KEY_SIZE];
        super::random_bytes(&mut buff)?;
        Ok(Self(buff))
    }

    /// Create a key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `KEY_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != KEY_SIZE {
            return Err(CryptoError::InvalidLength {
                what: "key",
                expected: KEY_SIZE,
                got: data.len(),
            });
        }
        let mut buff = [0; KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Get a reference to the raw key bytes.
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Encrypt a payload, returning the nonce, ciphertext, and detached tag.
    ///
    /// A random nonce is generated for each call, so sealing the same
    /// plaintext twice yields different ciphertexts.
    #[allow(clippy::type_complexity)]
    pub fn seal(
        &self,
        plaintext: &[u8],
    ) -> Result<([u8; NONCE_SIZE], Vec<u8>, [u8; TAG_SIZE]), CryptoError> {
        let key = Key::from_slice(self.bytes());
        let cipher = ChaCha20Poly1305::new(key);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        super::random_bytes(&mut nonce_bytes)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        // the aead crate appends the tag; detach it for the wire header
        let mut combined = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;
        let tag_start = combined.len() - TAG_SIZE;
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&combined[tag_start..]);
        combined.truncate(tag_start);

        Ok((nonce_bytes, combined, tag))
    }

    /// Decrypt a payload sealed with [`Dek::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Auth`] if the tag does not verify, including
    /// when the wrong key is used. No plaintext is ever returned on failure.
    pub fn open(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<Vec<u8>, CryptoError> {
        let key = Key::from_slice(self.bytes());
        let cipher = ChaCha20Poly1305::new(key);
        let nonce = Nonce::from_slice(nonce);

        let mut combined = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        combined.extend_from_slice(ciphertext);
        combined.extend_from_slice(tag);

        cipher
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| CryptoError::Auth)
    }
}
