//! The feed: one device's handle on a replicated, encrypted CRDT.
//!
//! A `Feed` owns the store handle, the unlocked header, the in-memory CRDT
//! state, and the causal clock. It is single-writer: each device appends ops
//! under its own actor id, and everything produced elsewhere arrives through
//! `sync`. All coordination happens through the content-addressed objects on
//! the shared medium; there is no other channel.

use std::collections::BTreeSet;

use coffer_store::{Kind, ObjectName, ObjectStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crdt::{Crdt, Dot, VersionVector};
use crate::envelope::{self, Payload};
use crate::error::{CofferError, Result};
use crate::header::{DekId, Header, HeaderState, KeyslotId};
use crate::object::EncryptedObject;

/// A decrypted op waiting to be folded into a state.
pub(crate) struct PendingOp<C: Crdt> {
    pub name: ObjectName,
    pub dot: Dot,
    pub deps: VersionVector,
    pub op: C::Op,
}

/// Pick the next op to fold: the smallest `(counter, actor)` among ops the
/// clock either admits or has already observed (duplicates fold without
/// applying). Selecting by this total order makes the fold result independent
/// of the order the store enumerated the objects in.
pub(crate) fn select_next<C: Crdt>(
    clock: &VersionVector,
    pending: &[PendingOp<C>],
) -> Option<usize> {
    pending
        .iter()
        .enumerate()
        .filter(|(_, p)| clock.contains(p.dot) || clock.admits(p.dot, &p.deps))
        .min_by_key(|(_, p)| (p.dot.counter, p.dot.actor))
        .map(|(i, _)| i)
}

/// One device's view of an encrypted feed.
#[derive(Debug)]
pub struct Feed<C: Crdt> {
    store: ObjectStore,
    actor: Uuid,
    header: Header,
    state: C,
    clock: VersionVector,
    /// Data objects already folded into `state`
    read: BTreeSet<ObjectName>,
    /// Header objects already merged into `header`
    header_objects: BTreeSet<ObjectName>,
}

impl<C: Crdt> Feed<C> {
    /// Initialize a brand-new feed on an empty store.
    ///
    /// Creates the first DEK and keyslot and persists the initial header.
    /// Fails with [`CofferError::AlreadyInitialized`] if the store already
    /// holds a header.
    pub async fn create(store: ObjectStore, actor: Uuid, password: &str) -> Result<Self> {
        if !store.list(Kind::Header).await?.is_empty() {
            return Err(CofferError::AlreadyInitialized);
        }

        let header = Header::init(password)?;
        let mut feed = Feed {
            store,
            actor,
            header,
            state: C::default(),
            clock: VersionVector::default(),
            read: BTreeSet::new(),
            header_objects: BTreeSet::new(),
        };
        feed.write_header().await?;

        info!(actor = %actor, "feed initialized");
        Ok(feed)
    }

    /// Open an existing feed: merge all header objects, unlock with the
    /// password, then fold in every readable data object.
    pub async fn open(store: ObjectStore, actor: Uuid, password: &str) -> Result<Self> {
        let names = store.list(Kind::Header).await?;
        if names.is_empty() {
            return Err(CofferError::NotInitialized);
        }

        let mut merged: Option<HeaderState> = None;
        let mut header_objects = BTreeSet::new();
        for name in names {
            let bytes = store.get(Kind::Header, &name).await?;
            match envelope::decode(&bytes)? {
                Payload::Header(state) => {
                    match merged.as_mut() {
                        Some(m) => m.merge(state),
                        None => merged = Some(state),
                    }
                    header_objects.insert(name);
                }
                _ => warn!(name = %name, "non-header payload in header namespace, skipping"),
            }
        }
        let merged = merged.ok_or(CofferError::NotInitialized)?;

        let header = Header::unlock(merged, password)?;
        let mut feed = Feed {
            store,
            actor,
            header,
            state: C::default(),
            clock: VersionVector::default(),
            read: BTreeSet::new(),
            header_objects,
        };
        feed.sync().await?;

        info!(actor = %actor, "feed opened");
        Ok(feed)
    }

    /// The current merged state.
    pub fn state(&self) -> &C {
        &self.state
    }

    /// This device's actor id.
    pub fn actor(&self) -> Uuid {
        self.actor
    }

    /// The causal clock over everything folded in so far.
    pub fn clock(&self) -> &VersionVector {
        &self.clock
    }

    /// Live keyslots by id, with the DEK each unlocks.
    pub fn keyslots(&self) -> Vec<(KeyslotId, DekId)> {
        self.header
            .state()
            .live_keyslots()
            .map(|(id, slot)| (id, slot.dek_id))
            .collect()
    }

    pub(crate) fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub(crate) fn header(&self) -> &Header {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub(crate) fn fold_in(&mut self, state: C, clock: &VersionVector) {
        self.state.merge(state);
        self.clock.merge(clock);
    }

    pub(crate) fn mark_read(&mut self, name: ObjectName) {
        self.read.insert(name);
    }

    pub(crate) fn forget(&mut self, name: &ObjectName) {
        self.read.remove(name);
    }

    /// Produce one local op: stamp it with the next dot, persist it sealed
    /// under the current DEK, then apply it locally. The local state only
    /// advances once the object is durably stored.
    pub async fn append(&mut self, op: C::Op) -> Result<ObjectName> {
        let dot = Dot {
            actor: self.actor,
            counter: self.clock.get(self.actor) + 1,
        };
        let payload = Payload::Op {
            dot,
            deps: self.clock.clone(),
            body: bincode::serialize(&op)?,
        };

        let name = self.put_sealed(&payload).await?;
        self.state.apply(op);
        self.clock.advance(dot);
        self.read.insert(name);

        debug!(name = %name, actor = %dot.actor, counter = dot.counter, "op appended");
        Ok(name)
    }

    /// Fold in everything new on the medium. Returns the number of objects
    /// folded.
    ///
    /// Objects that cannot be read right now (corrupt, undecryptable, or
    /// sealed under a DEK this password holds no slot for) are skipped with a
    /// warning and retried on the next sync; they never halt the rest.
    /// Ops whose dependencies are not yet satisfied stay unread and are
    /// picked up again once the missing objects arrive.
    pub async fn sync(&mut self) -> Result<usize> {
        self.sync_header().await?;

        let names = self.store.list(Kind::Data).await?;
        let mut pending: Vec<PendingOp<C>> = Vec::new();
        let mut folded = 0;

        for name in names {
            if self.read.contains(&name) {
                continue;
            }
            let payload = match self.fetch(&name).await {
                Ok((_, payload)) => payload,
                Err(err) => {
                    warn!(name = %name, error = %err, "object unreadable, skipping");
                    continue;
                }
            };
            match payload {
                Payload::FullState { clock, body } => {
                    let state: C = match bincode::deserialize(&body) {
                        Ok(state) => state,
                        Err(err) => {
                            warn!(name = %name, error = %err, "state body undecodable, skipping");
                            continue;
                        }
                    };
                    self.fold_in(state, &clock);
                    self.read.insert(name);
                    folded += 1;
                }
                Payload::Op { dot, deps, body } => {
                    let op: C::Op = match bincode::deserialize(&body) {
                        Ok(op) => op,
                        Err(err) => {
                            warn!(name = %name, error = %err, "op body undecodable, skipping");
                            continue;
                        }
                    };
                    pending.push(PendingOp {
                        name,
                        dot,
                        deps,
                        op,
                    });
                }
                Payload::Header(_) => {
                    warn!(name = %name, "header payload in data namespace, ignoring");
                    self.read.insert(name);
                }
            }
        }

        while let Some(i) = select_next(&self.clock, &pending) {
            let p = pending.swap_remove(i);
            if !self.clock.contains(p.dot) {
                self.state.apply(p.op);
                self.clock.advance(p.dot);
            }
            self.read.insert(p.name);
            folded += 1;
        }

        if !pending.is_empty() {
            debug!(deferred = pending.len(), "ops deferred until dependencies arrive");
        }
        Ok(folded)
    }

    /// Switch new writes to a fresh DEK. Old objects stay readable under
    /// their retired keys until compaction rewrites them.
    pub async fn rotate(&mut self, password: &str) -> Result<DekId> {
        self.sync_header().await?;
        let id = self.header.rotate(password)?;
        self.write_header().await?;
        Ok(id)
    }

    /// Enroll an additional password.
    pub async fn add_password(&mut self, password: &str) -> Result<usize> {
        self.sync_header().await?;
        let added = self.header.add_password(password)?;
        self.write_header().await?;
        Ok(added)
    }

    /// Revoke a keyslot. The revoked password loses access to everything
    /// written after the next rotation; see [`Feed::rotate`].
    pub async fn revoke_password(&mut self, keyslot: KeyslotId) -> Result<()> {
        self.sync_header().await?;
        self.header.revoke_password(keyslot)?;
        self.write_header().await?;
        Ok(())
    }

    /// Merge any header objects other devices have written.
    pub(crate) async fn sync_header(&mut self) -> Result<()> {
        for name in self.store.list(Kind::Header).await? {
            if self.header_objects.contains(&name) {
                continue;
            }
            let bytes = self.store.get(Kind::Header, &name).await?;
            match envelope::decode(&bytes)? {
                Payload::Header(state) => {
                    self.header.merge(state);
                    self.header_objects.insert(name);
                }
                _ => warn!(name = %name, "non-header payload in header namespace, skipping"),
            }
        }
        Ok(())
    }

    /// Persist the compacted header state and delete the header objects it
    /// subsumes. The new object is written before anything is removed.
    pub(crate) async fn write_header(&mut self) -> Result<()> {
        let bytes = envelope::encode(&Payload::Header(self.header.compacted()))?;
        let name = self.store.put(Kind::Header, bytes).await?;

        let old: Vec<ObjectName> = self
            .header_objects
            .iter()
            .filter(|n| **n != name)
            .copied()
            .collect();
        for stale in old {
            self.store.delete(Kind::Header, &stale).await?;
            self.header_objects.remove(&stale);
        }
        self.header_objects.insert(name);

        debug!(name = %name, "header written");
        Ok(())
    }

    pub(crate) async fn put_sealed(&self, payload: &Payload) -> Result<ObjectName> {
        let (dek_id, dek) = self.header.current()?;
        let object = EncryptedObject::seal(dek_id, dek, &envelope::encode(payload)?)?;
        Ok(self.store.put(Kind::Data, object.to_bytes()).await?)
    }

    pub(crate) async fn fetch(&self, name: &ObjectName) -> Result<(DekId, Payload)> {
        let bytes = self.store.get(Kind::Data, name).await?;
        let object = EncryptedObject::from_bytes(&bytes)?;
        let dek = self
            .header
            .dek(object.dek_id)
            .ok_or(CofferError::UnknownDek(object.dek_id))?;
        let plaintext = object
            .open(dek)
            .map_err(|_| CofferError::AuthFailure { name: *name })?;
        Ok((object.dek_id, envelope::decode(&plaintext)?))
    }
}
