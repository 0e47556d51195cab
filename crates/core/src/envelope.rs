//! The versioned payload envelope carried inside every encrypted object.
//!
//! Layout: a 2-byte little-endian schema version, then the bincode-encoded
//! payload. The version is checked before the payload is touched so future
//! schema changes stay readable and unknown ones fail cleanly.

use serde::{Deserialize, Serialize};

use crate::crdt::{Dot, VersionVector};
use crate::error::{CofferError, Result};
use crate::header::HeaderState;

/// Current envelope schema version.
pub const ENVELOPE_VERSION: u16 = 1;

// needs to be sorted!
const SUPPORTED_VERSIONS: [u16; 1] = [ENVELOPE_VERSION];

/// Decrypted payload of a stored object.
///
/// `body` fields are the opaque bincode encoding of the concrete CRDT's op
/// or state; this layer only interprets the causal metadata around them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// A single incremental change.
    Op {
        /// Logical timestamp of this op
        dot: Dot,
        /// Clock the producer had observed when it created the op
        deps: VersionVector,
        /// Opaque encoded op
        body: Vec<u8>,
    },
    /// A complete, self-contained snapshot.
    FullState {
        /// Clock of everything folded into this state
        clock: VersionVector,
        /// Opaque encoded state
        body: Vec<u8>,
    },
    /// The key-management header, itself a full state of the header CRDT.
    Header(HeaderState),
}

/// Encode a payload into envelope bytes.
pub fn encode(payload: &Payload) -> Result<Vec<u8>> {
    let body = bincode::serialize(payload)?;
    let mut out = Vec::with_capacity(2 + body.len());
    out.extend_from_slice(&ENVELOPE_VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode envelope bytes, checking the schema version first.
pub fn decode(bytes: &[u8]) -> Result<Payload> {
    if bytes.len() < 2 {
        return Err(anyhow::anyhow!("envelope too short for version prefix").into());
    }

    let version = u16::from_le_bytes([bytes[0], bytes[1]]);
    if SUPPORTED_VERSIONS.binary_search(&version).is_err() {
        return Err(CofferError::UnsupportedVersion(version));
    }

    Ok(bincode::deserialize(&bytes[2..])?)
}
