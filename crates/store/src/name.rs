//! Object names and store namespaces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Size of a BLAKE3 digest in bytes (256 bits).
pub const DIGEST_SIZE: usize = 32;

/// Content hash of a stored object, used as its file name on the sync medium.
///
/// Displayed and parsed as lowercase hex. Because the name is derived from the
/// object's full byte content, two devices that produce identical bytes store
/// them under the same name and the write deduplicates.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectName([u8; DIGEST_SIZE]);

impl ObjectName {
    /// Compute the name of a byte sequence.
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Get a reference to the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl From<[u8; DIGEST_SIZE]> for ObjectName {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectName({})", self)
    }
}

impl FromStr for ObjectName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digest = [0u8; DIGEST_SIZE];
        hex::decode_to_slice(s, &mut digest)
            .map_err(|_| StoreError::InvalidName(s.to_string()))?;
        Ok(Self(digest))
    }
}

/// Namespace an object lives in within the store.
///
/// The sync transport replicates both namespaces as plain files. `Header` is
/// the reserved, well-known location every device checks first: it holds the
/// keyslot table and is readable before any data key is unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Encrypted op and full-state objects.
    Data,
    /// Header objects (keyslots and data-key metadata).
    Header,
}

impl Kind {
    /// Directory prefix for this namespace.
    pub fn prefix(&self) -> &'static str {
        match self {
            Kind::Data => "data",
            Kind::Header => "header",
        }
    }
}
