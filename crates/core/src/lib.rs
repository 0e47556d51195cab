//! Encrypted, content-addressable storage for CRDT changes.
//!
//! Every change to a replicated data type is sealed into an immutable
//! encrypted object named by the hash of its bytes, so any dumb shared
//! medium (a synced folder, a bucket) can carry the feed without being
//! trusted with plaintext or structure. Devices converge by merging what
//! they find; a compactor folds the op log into snapshots; passwords
//! unlock keyslots, never data, so key rotation and password changes
//! never rewrite history in place.

pub mod compactor;
pub mod crdt;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod feed;
pub mod header;
pub mod object;

pub use compactor::Compaction;
pub use crdt::{Crdt, Dot, VersionVector};
pub use error::{CofferError, Result};
pub use feed::Feed;
pub use header::{DekId, DekState, Header, HeaderState, Keyslot, KeyslotId};
pub use object::EncryptedObject;

pub use coffer_store::{Kind, ObjectName, ObjectStore, StorageConfig};
