//! Password key derivation and keyslot wrapping.
//!
//! A password never encrypts data directly. It is stretched with Argon2id
//! into a key-encryption key, which wraps a DEK with AES-KW (RFC 3394). The
//! derivation parameters are stored next to every keyslot so they can be
//! strengthened later without breaking old slots.

use std::fmt;

use aes_kw::KekAes256;
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use super::dek::{CryptoError, Dek, KEY_SIZE};

/// Size of a keyslot salt in bytes
pub const SALT_SIZE: usize = 16;
/// Size of an AES-KW wrapped DEK in bytes (32-byte key + 8-byte integrity block)
pub const WRAPPED_DEK_SIZE: usize = KEY_SIZE + 8;

// Argon2id defaults for new keyslots (memory in KiB).
const DEFAULT_M_COST_KIB: u32 = 19_456;
const DEFAULT_T_COST: u32 = 2;
const DEFAULT_P_COST: u32 = 1;

/// Stored Argon2id parameters for one keyslot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Per-slot random salt
    pub salt: [u8; SALT_SIZE],
    /// Memory cost in KiB
    pub m_cost_kib: u32,
    /// Iteration count
    pub t_cost: u32,
    /// Degree of parallelism
    pub p_cost: u32,
}

impl KdfParams {
    /// Generate parameters for a new keyslot with a fresh random salt.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut salt = [0u8; SALT_SIZE];
        super::random_bytes(&mut salt)?;
        Ok(Self {
            salt,
            m_cost_kib: DEFAULT_M_COST_KIB,
            t_cost: DEFAULT_T_COST,
            p_cost: DEFAULT_P_COST,
        })
    }

    /// Derive a key-encryption key from a password with these parameters.
    pub fn derive(&self, password: &str) -> Result<Kek, CryptoError> {
        let params = Params::new(self.m_cost_kib, self.t_cost, self.p_cost, Some(KEY_SIZE))
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut out = [0u8; KEY_SIZE];
        argon
            .hash_password_into(password.as_bytes(), &self.salt, &mut out)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;

        Ok(Kek(out))
    }
}

/// A key-encryption key derived from a password.
///
/// Used only to wrap and unwrap DEKs, never to encrypt payload data.
#[derive(Clone, PartialEq, Eq)]
pub struct Kek([u8; KEY_SIZE]);

impl fmt::Debug for Kek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Kek(..)")
    }
}

impl Kek {
    /// Wrap a DEK under this key with AES-KW.
    pub fn wrap(&self, dek: &Dek) -> Result<Vec<u8>, CryptoError> {
        let kek = KekAes256::from(self.0);
        kek.wrap_vec(dek.bytes())
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error").into())
    }

    /// Unwrap a DEK wrapped with [`Kek::wrap`].
    ///
    /// AES-KW carries its own integrity check, so unwrapping with a key
    /// derived from the wrong password fails with [`CryptoError::Auth`].
    pub fn unwrap(&self, wrapped: &[u8]) -> Result<Dek, CryptoError> {
        if wrapped.len() != WRAPPED_DEK_SIZE {
            return Err(CryptoError::InvalidLength {
                what: "wrapped key",
                expected: WRAPPED_DEK_SIZE,
                got: wrapped.len(),
            });
        }

        let kek = KekAes256::from(self.0);
        let unwrapped = kek.unwrap_vec(wrapped).map_err(|_| CryptoError::Auth)?;
        Dek::from_slice(&unwrapped)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let params = KdfParams::generate().unwrap();
        let a = params.derive("hunter2").unwrap();
        let b = params.derive("hunter2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_differs_by_salt_and_password() {
        let params = KdfParams::generate().unwrap();
        let other_params = KdfParams::generate().unwrap();

        assert_ne!(
            params.derive("hunter2").unwrap(),
            params.derive("hunter3").unwrap()
        );
        assert_ne!(
            params.derive("hunter2").unwrap(),
            other_params.derive("hunter2").unwrap()
        );
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let params = KdfParams::generate().unwrap();
        let kek = params.derive("correct horse").unwrap();
        let dek = Dek::generate().unwrap();

        let wrapped = kek.wrap(&dek).unwrap();
        assert_eq!(wrapped.len(), WRAPPED_DEK_SIZE);

        let unwrapped = kek.unwrap(&wrapped).unwrap();
        assert_eq!(dek, unwrapped);
    }

    #[test]
    fn test_unwrap_with_wrong_password_fails() {
        let params = KdfParams::generate().unwrap();
        let dek = Dek::generate().unwrap();
        let wrapped = params.derive("right").unwrap().wrap(&dek).unwrap();

        let result = params.derive("wrong").unwrap().unwrap(&wrapped);
        assert!(matches!(result, Err(CryptoError::Auth)));
    }

    #[test]
    fn test_unwrap_rejects_bad_length() {
        let params = KdfParams::generate().unwrap();
        let kek = params.derive("pw").unwrap();
        assert!(matches!(
            kek.unwrap(&[0u8; 16]),
            Err(CryptoError::InvalidLength { .. })
        ));
    }
}
