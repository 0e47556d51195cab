//! Error types for the object store.

use crate::name::ObjectName;

/// Errors that can occur when working with the object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend storage error
    #[error("object storage error: {0}")]
    Backend(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes no longer hash to the object's name
    #[error("corrupt object {name}: content hashes to {computed}")]
    Corrupt {
        /// Name the object was stored under
        name: ObjectName,
        /// Hash the stored bytes actually have
        computed: ObjectName,
    },

    /// Object not present in the store
    #[error("object not found: {0}")]
    NotFound(ObjectName),

    /// A file name in the store does not parse as a content hash
    #[error("invalid object name: {0}")]
    InvalidName(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for object store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
