//! Error types for the core layer.

use coffer_store::ObjectName;
use uuid::Uuid;

use crate::crypto::CryptoError;

/// Errors surfaced by the encrypted storage core.
#[derive(Debug, thiserror::Error)]
pub enum CofferError {
    /// Object store failure (IO, missing object, or content-hash mismatch)
    #[error("store error: {0}")]
    Store(#[from] coffer_store::StoreError),

    /// An object failed authenticated decryption
    #[error("decryption failed for object {name}")]
    AuthFailure {
        /// Name of the object that could not be decrypted
        name: ObjectName,
    },

    /// No keyslot unlocks with the given password
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Refused to remove the only access path to a still-referenced DEK
    #[error("keyslot {keyslot} is the last one unlocking data key {dek}")]
    LastKeyslot {
        /// The keyslot that was asked to be removed
        keyslot: Uuid,
        /// The DEK it is the last access path to
        dek: Uuid,
    },

    /// An object names a DEK this header holds no usable key material for
    #[error("no usable key material for data key {0}")]
    UnknownDek(Uuid),

    /// Envelope or object format version not supported by this build
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    /// Payload (de)serialization failure
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Crypto primitive failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// `create` called on a store that already holds a header
    #[error("store is already initialized")]
    AlreadyInitialized,

    /// `open` called on a store with no header objects
    #[error("store is not initialized")]
    NotInitialized,

    /// Catch-all
    #[error(transparent)]
    Default(#[from] anyhow::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CofferError>;
