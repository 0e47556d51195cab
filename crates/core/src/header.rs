//! Header and key management.
//!
//! The header owns the data-encryption keys. It is modeled after a
//! multi-passphrase disk-encryption header: passwords never encrypt data,
//! they unwrap keyslots, so adding, changing, or revoking a password never
//! touches a single data object. The header itself is a CRDT full state, so
//! header changes propagate and merge exactly like data changes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::crdt::Crdt;
use crate::crypto::{Dek, KdfParams};
use crate::error::{CofferError, Result};

/// Identifier of a data-encryption key.
pub type DekId = Uuid;
/// Identifier of a keyslot.
pub type KeyslotId = Uuid;

/// Lifecycle state of a DEK. Ordered as a lattice: merge joins by max, so a
/// state only ever moves forward even across concurrent header updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DekState {
    /// Used for new writes
    Active,
    /// Kept for decrypting old objects, no new writes
    Retired,
    /// No live object references it; pruned at the next header compaction
    Purgeable,
}

/// Metadata for one DEK. The key material itself lives only in keyslots
/// (wrapped) and in unlocked [`Header`] handles (in memory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DekRecord {
    /// Rotation epoch; the current DEK is the Active record with the
    /// highest (epoch, id)
    pub epoch: u64,
    /// Lifecycle state
    pub state: DekState,
}

/// A password-wrapped copy of one DEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyslot {
    /// The DEK this slot unlocks
    pub dek_id: DekId,
    /// Stored derivation parameters for the wrapping password
    pub params: KdfParams,
    /// AES-KW wrapped DEK
    pub wrapped: Vec<u8>,
}

/// An op against the header CRDT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeaderOp {
    /// Introduce a new DEK record.
    AddDek {
        /// New DEK id
        id: DekId,
        /// Its record
        record: DekRecord,
    },
    /// Stop using a DEK for new writes.
    RetireDek(DekId),
    /// Mark a DEK as no longer referenced by any stored object.
    MarkPurgeable(DekId),
    /// Enroll a keyslot.
    AddKeyslot {
        /// New keyslot id
        id: KeyslotId,
        /// The slot
        slot: Keyslot,
    },
    /// Revoke a keyslot.
    RemoveKeyslot(KeyslotId),
}

/// Full state of the header CRDT: the keyslot table and DEK validity set.
///
/// DEK records and keyslots are grow-only; revocation uses tombstones so a
/// merge can never silently drop a keyslot another device still relies on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderState {
    deks: BTreeMap<DekId, DekRecord>,
    keyslots: BTreeMap<KeyslotId, Keyslot>,
    removed_keyslots: BTreeSet<KeyslotId>,
}

impl Crdt for HeaderState {
    type Op = HeaderOp;

    fn apply(&mut self, op: HeaderOp) {
        match op {
            HeaderOp::AddDek { id, record } => {
                self.deks.entry(id).or_insert(record);
            }
            HeaderOp::RetireDek(id) => {
                if let Some(record) = self.deks.get_mut(&id) {
                    record.state = record.state.max(DekState::Retired);
                }
            }
            HeaderOp::MarkPurgeable(id) => {
                if let Some(record) = self.deks.get_mut(&id) {
                    record.state = DekState::Purgeable;
                }
            }
            HeaderOp::AddKeyslot { id, slot } => {
                self.keyslots.entry(id).or_insert(slot);
            }
            HeaderOp::RemoveKeyslot(id) => {
                self.removed_keyslots.insert(id);
            }
        }
    }

    fn merge(&mut self, other: HeaderState) {
        for (id, record) in other.deks {
            match self.deks.get_mut(&id) {
                Some(existing) => {
                    existing.state = existing.state.max(record.state);
                    existing.epoch = existing.epoch.max(record.epoch);
                }
                None => {
                    self.deks.insert(id, record);
                }
            }
        }
        for (id, slot) in other.keyslots {
            self.keyslots.entry(id).or_insert(slot);
        }
        self.removed_keyslots.extend(other.removed_keyslots);
    }
}

impl HeaderState {
    /// Keyslots that have not been revoked.
    pub fn live_keyslots(&self) -> impl Iterator<Item = (KeyslotId, &Keyslot)> {
        self.keyslots
            .iter()
            .filter(|(id, _)| !self.removed_keyslots.contains(id))
            .map(|(id, slot)| (*id, slot))
    }

    /// All DEK records.
    pub fn deks(&self) -> impl Iterator<Item = (DekId, &DekRecord)> {
        self.deks.iter().map(|(id, record)| (*id, record))
    }

    /// The DEK used for new writes: the Active record with the highest
    /// (epoch, id). Deterministic across devices, even when two devices
    /// rotated concurrently and both new DEKs are still Active.
    pub fn current_dek_id(&self) -> Option<DekId> {
        self.deks
            .iter()
            .filter(|(_, record)| record.state == DekState::Active)
            .max_by_key(|(id, record)| (record.epoch, **id))
            .map(|(id, _)| *id)
    }

    fn max_epoch(&self) -> u64 {
        self.deks.values().map(|r| r.epoch).max().unwrap_or(0)
    }

    fn dek_state(&self, id: DekId) -> Option<DekState> {
        self.deks.get(&id).map(|r| r.state)
    }
}

/// An unlocked header: the shared [`HeaderState`] plus the DEKs the caller's
/// password could actually unwrap.
///
/// Passed explicitly to everything that needs a key; there is no ambient
/// process-wide key state.
#[derive(Debug, Clone)]
pub struct Header {
    state: HeaderState,
    unlocked: BTreeMap<DekId, Dek>,
}

impl Header {
    /// Create a brand-new header with one Active DEK and one keyslot for
    /// `password`. A DEK never exists without at least one keyslot.
    pub fn init(password: &str) -> Result<Self> {
        let mut header = Header {
            state: HeaderState::default(),
            unlocked: BTreeMap::new(),
        };
        header.add_dek(password)?;
        Ok(header)
    }

    /// Unlock a header state with a password.
    ///
    /// Tries each live keyslot with its own stored derivation parameters;
    /// every slot that unwraps contributes its DEK. If no slot matches the
    /// password, fails with [`CofferError::AuthenticationFailed`] and no
    /// key material is exposed. Nothing reveals which slot was close.
    pub fn unlock(state: HeaderState, password: &str) -> Result<Self> {
        let mut unlocked = BTreeMap::new();

        for (_, slot) in state.live_keyslots() {
            if unlocked.contains_key(&slot.dek_id) {
                continue;
            }
            let kek = slot.params.derive(password)?;
            if let Ok(dek) = kek.unwrap(&slot.wrapped) {
                unlocked.insert(slot.dek_id, dek);
            }
        }

        if unlocked.is_empty() {
            return Err(CofferError::AuthenticationFailed);
        }

        debug!(deks = unlocked.len(), "header unlocked");
        Ok(Header { state, unlocked })
    }

    /// The shared header state, for persisting or merging.
    pub fn state(&self) -> &HeaderState {
        &self.state
    }

    /// Merge a remote header state in. DEKs this password holds no keyslot
    /// for stay locked; objects under them surface as [`CofferError::UnknownDek`].
    pub fn merge(&mut self, other: HeaderState) {
        self.state.merge(other);
    }

    /// Unwrapped key material for a DEK, if this password unlocked it.
    pub fn dek(&self, id: DekId) -> Option<&Dek> {
        self.unlocked.get(&id)
    }

    /// The DEK to use for new writes.
    pub fn current(&self) -> Result<(DekId, &Dek)> {
        let id = self
            .state
            .current_dek_id()
            .ok_or_else(|| anyhow::anyhow!("header has no active data key"))?;
        let dek = self.unlocked.get(&id).ok_or(CofferError::UnknownDek(id))?;
        Ok((id, dek))
    }

    /// Generate a new DEK, mark it Active, and retire the previous current
    /// DEK. The new DEK gets its keyslot for `password` before the old one
    /// is retired, so it is never left without an access path.
    pub fn rotate(&mut self, password: &str) -> Result<DekId> {
        let previous = self.state.current_dek_id();
        let id = self.add_dek(password)?;
        if let Some(prev) = previous {
            self.state.apply(HeaderOp::RetireDek(prev));
        }
        debug!(dek = %id, retired = ?previous, "rotated data key");
        Ok(id)
    }

    /// Enroll a new password, wrapping every unlocked, still-referenced DEK
    /// into a keyslot for it (current and retired alike, so the new password
    /// can also read objects written before it existed).
    ///
    /// Returns the number of keyslots created.
    pub fn add_password(&mut self, password: &str) -> Result<usize> {
        let params = KdfParams::generate()?;
        let kek = params.derive(password)?;

        let mut added = 0;
        for (id, dek) in &self.unlocked {
            if self.state.dek_state(*id) == Some(DekState::Purgeable) {
                continue;
            }
            let slot = Keyslot {
                dek_id: *id,
                params: params.clone(),
                wrapped: kek.wrap(dek)?,
            };
            self.state.apply(HeaderOp::AddKeyslot {
                id: Uuid::new_v4(),
                slot,
            });
            added += 1;
        }

        debug!(keyslots = added, "password enrolled");
        Ok(added)
    }

    /// Revoke a keyslot.
    ///
    /// Refuses with [`CofferError::LastKeyslot`] if the slot is the only
    /// live one unlocking a DEK that stored objects may still reference.
    pub fn revoke_password(&mut self, keyslot: KeyslotId) -> Result<()> {
        let slot = self
            .state
            .live_keyslots()
            .find(|(id, _)| *id == keyslot)
            .map(|(_, slot)| slot.clone())
            .ok_or_else(|| anyhow::anyhow!("no such keyslot: {}", keyslot))?;

        if self.state.dek_state(slot.dek_id) != Some(DekState::Purgeable) {
            let has_other = self
                .state
                .live_keyslots()
                .any(|(id, s)| id != keyslot && s.dek_id == slot.dek_id);
            if !has_other {
                return Err(CofferError::LastKeyslot {
                    keyslot,
                    dek: slot.dek_id,
                });
            }
        }

        self.state.apply(HeaderOp::RemoveKeyslot(keyslot));
        debug!(keyslot = %keyslot, "keyslot revoked");
        Ok(())
    }

    /// Record that compaction proved no stored object references this DEK.
    pub fn mark_purgeable(&mut self, id: DekId) {
        self.state.apply(HeaderOp::MarkPurgeable(id));
        self.unlocked.remove(&id);
    }

    /// The state to persist: purgeable DEKs, their keyslots, and revoked
    /// slot bodies are pruned. Tombstones are kept so a merge with a stale
    /// header cannot resurrect a revoked slot.
    pub fn compacted(&self) -> HeaderState {
        let deks: BTreeMap<DekId, DekRecord> = self
            .state
            .deks
            .iter()
            .filter(|(_, record)| record.state != DekState::Purgeable)
            .map(|(id, record)| (*id, record.clone()))
            .collect();

        let keyslots = self
            .state
            .keyslots
            .iter()
            .filter(|(id, slot)| {
                !self.state.removed_keyslots.contains(id) && deks.contains_key(&slot.dek_id)
            })
            .map(|(id, slot)| (*id, slot.clone()))
            .collect();

        HeaderState {
            deks,
            keyslots,
            removed_keyslots: self.state.removed_keyslots.clone(),
        }
    }

    fn add_dek(&mut self, password: &str) -> Result<DekId> {
        let dek = Dek::generate()?;
        let id = Uuid::new_v4();
        let epoch = self.state.max_epoch() + 1;

        let params = KdfParams::generate()?;
        let wrapped = params.derive(password)?.wrap(&dek)?;

        self.state.apply(HeaderOp::AddDek {
            id,
            record: DekRecord {
                epoch,
                state: DekState::Active,
            },
        });
        self.state.apply(HeaderOp::AddKeyslot {
            id: Uuid::new_v4(),
            slot: Keyslot {
                dek_id: id,
                params,
                wrapped,
            },
        });
        self.unlocked.insert(id, dek);

        Ok(id)
    }
}
