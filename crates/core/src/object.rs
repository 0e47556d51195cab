//! The on-medium encrypted object format.
//!
//! An `EncryptedObject` is the only thing ever physically stored or synced.
//! Its byte layout is fixed so every device (and nothing else) can read it:
//!
//! ```text
//! [ version: 1 ][ dek_id: 16 ][ nonce: 12 ][ tag: 16 ][ ciphertext ]
//! ```
//!
//! The file name on the sync medium is the BLAKE3 hash of that full byte
//! sequence, hex-encoded. The DEK id is deliberately visible metadata: it
//! lets a reader pick the right key directly instead of trial-decrypting
//! with every retained key, and leaks only which key epoch was in use.

use coffer_store::ObjectName;
use uuid::Uuid;

use crate::crypto::{CryptoError, Dek, NONCE_SIZE, TAG_SIZE};
use crate::error::{CofferError, Result};

/// Current object format version.
pub const OBJECT_FORMAT_VERSION: u8 = 1;

const DEK_ID_SIZE: usize = 16;
const HEADER_SIZE: usize = 1 + DEK_ID_SIZE + NONCE_SIZE + TAG_SIZE;

/// An immutable encrypted object as stored on the sync medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedObject {
    /// Identifier of the DEK the payload was encrypted under
    pub dek_id: Uuid,
    /// AEAD nonce
    pub nonce: [u8; NONCE_SIZE],
    /// Detached authentication tag
    pub tag: [u8; TAG_SIZE],
    /// Encrypted serialized payload
    pub ciphertext: Vec<u8>,
}

impl EncryptedObject {
    /// Encrypt a plaintext payload under the given DEK.
    pub fn seal(dek_id: Uuid, dek: &Dek, plaintext: &[u8]) -> Result<Self> {
        let (nonce, ciphertext, tag) = dek.seal(plaintext)?;
        Ok(Self {
            dek_id,
            nonce,
            tag,
            ciphertext,
        })
    }

    /// Decrypt the payload with the DEK named by `dek_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Auth`] if the tag does not verify.
    pub fn open(&self, dek: &Dek) -> std::result::Result<Vec<u8>, CryptoError> {
        dek.open(&self.nonce, &self.ciphertext, &self.tag)
    }

    /// Serialize to the on-medium byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
        out.push(OBJECT_FORMAT_VERSION);
        out.extend_from_slice(self.dek_id.as_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the on-medium byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CryptoError::InvalidLength {
                what: "object",
                expected: HEADER_SIZE,
                got: bytes.len(),
            }
            .into());
        }

        let version = bytes[0];
        if version != OBJECT_FORMAT_VERSION {
            return Err(CofferError::UnsupportedVersion(version as u16));
        }

        let mut dek_id = [0u8; DEK_ID_SIZE];
        dek_id.copy_from_slice(&bytes[1..1 + DEK_ID_SIZE]);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[1 + DEK_ID_SIZE..1 + DEK_ID_SIZE + NONCE_SIZE]);

        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&bytes[1 + DEK_ID_SIZE + NONCE_SIZE..HEADER_SIZE]);

        Ok(Self {
            dek_id: Uuid::from_bytes(dek_id),
            nonce,
            tag,
            ciphertext: bytes[HEADER_SIZE..].to_vec(),
        })
    }

    /// The content-derived name this object will be stored under.
    pub fn name(&self) -> ObjectName {
        ObjectName::of(&self.to_bytes())
    }
}
