//! Content-addressable storage for encrypted CRDT objects.
//!
//! Objects are immutable blobs named by the BLAKE3 hash of their content.
//! The store verifies that hash on every read, so tampering or corruption on
//! the sync medium is always detected. The only mutation it supports is
//! deletion; an object is never edited in place.

mod error;
mod name;
mod storage;
mod store;

pub use error::{Result, StoreError};
pub use name::{Kind, ObjectName, DIGEST_SIZE};
pub use storage::StorageConfig;
pub use store::ObjectStore;
