//! Cryptographic primitives.
//!  - Data-encryption keys and authenticated encryption
//!  - Password key derivation (Argon2id) with stored parameters
//!  - Keyslot wrapping (AES-KW)

mod dek;
mod kdf;

pub use dek::{Dek, CryptoError, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use kdf::{Kek, KdfParams, SALT_SIZE, WRAPPED_DEK_SIZE};

/// Fill a buffer with cryptographically secure random bytes.
pub fn random_bytes(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|e| anyhow::anyhow!("rng failure: {}", e).into())
}
