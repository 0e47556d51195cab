//! Compaction: fold the op log into a single encrypted snapshot.
//!
//! Compaction is the only thing that ever deletes data objects, and it is
//! fail-safe by construction: every input must decrypt and decode before
//! anything is written, and the replacement snapshot must be durably stored
//! before any input is removed. A crash at any point leaves the medium
//! holding at least as much information as before.
//!
//! It is also the point where old DEKs die. A snapshot is sealed under the
//! current DEK, so after a clean pass with nothing deferred, retired keys
//! have no remaining referents and can be purged from the header.

use coffer_store::{Kind, ObjectName};
use tracing::{info, warn};

use crate::crdt::{Crdt, VersionVector};
use crate::envelope::Payload;
use crate::error::Result;
use crate::feed::{select_next, Feed, PendingOp};
use crate::header::{DekId, DekState};

/// What a compaction pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    /// Name of the surviving full-state object
    pub state: ObjectName,
    /// Full states merged into it
    pub merged_states: usize,
    /// Ops folded into it
    pub folded_ops: usize,
    /// Input objects deleted
    pub removed: usize,
    /// Ops left in place because their dependencies are not yet present
    pub deferred: usize,
    /// DEKs retired keys proven unreferenced and purged this pass
    pub purged_deks: Vec<DekId>,
}

impl<C: Crdt> Feed<C> {
    /// Replace the accumulated ops and snapshots with one merged snapshot.
    ///
    /// Aborts without deleting anything if any data object is corrupt,
    /// undecryptable, or sealed under a DEK this header cannot unlock;
    /// compaction needs the whole picture before it may discard inputs.
    /// Ops whose dependencies are missing are left in place untouched.
    pub async fn compact(&mut self) -> Result<Compaction> {
        self.sync_header().await?;
        let names = self.store().list(Kind::Data).await?;

        // decrypt everything up front; any failure aborts the pass
        let mut state_names: Vec<ObjectName> = Vec::new();
        let mut state_deks: Vec<DekId> = Vec::new();
        let mut base = C::default();
        let mut clock = VersionVector::default();
        let mut pending: Vec<PendingOp<C>> = Vec::new();
        let mut stray = 0usize;

        for name in names {
            match self.fetch(&name).await? {
                (dek_id, Payload::FullState { clock: c, body }) => {
                    base.merge(bincode::deserialize(&body)?);
                    clock.merge(&c);
                    state_names.push(name);
                    state_deks.push(dek_id);
                }
                (_, Payload::Op { dot, deps, body }) => pending.push(PendingOp {
                    name,
                    dot,
                    deps,
                    op: bincode::deserialize(&body)?,
                }),
                (_, Payload::Header(_)) => {
                    warn!(name = %name, "header payload in data namespace, left in place");
                    stray += 1;
                }
            }
        }
        let merged_states = state_names.len();

        let mut folded_names: Vec<ObjectName> = Vec::new();
        while let Some(i) = select_next(&clock, &pending) {
            let p = pending.swap_remove(i);
            if !clock.contains(p.dot) {
                base.apply(p.op);
                clock.advance(p.dot);
            }
            folded_names.push(p.name);
        }
        let deferred = pending.len();

        // nothing to fold and a single snapshot already sealed under the
        // current DEK: rewriting it would mint a fresh nonce and a fresh name
        // for identical content. A lone snapshot under a stale key falls
        // through instead, so it gets re-sealed and the old key can retire.
        if folded_names.is_empty()
            && state_names.len() == 1
            && state_deks[0] == self.header().current()?.0
        {
            let state = state_names[0];
            self.fold_in(base, &clock);
            self.mark_read(state);
            return Ok(Compaction {
                state,
                merged_states,
                folded_ops: 0,
                removed: 0,
                deferred,
                purged_deks: Vec::new(),
            });
        }

        let payload = Payload::FullState {
            clock: clock.clone(),
            body: bincode::serialize(&base)?,
        };
        let state = self.put_sealed(&payload).await?;

        // the snapshot is durable; now the inputs may go
        let mut removed = 0;
        for name in state_names.iter().chain(folded_names.iter()) {
            if *name == state {
                continue;
            }
            self.store().delete(Kind::Data, name).await?;
            self.forget(name);
            removed += 1;
        }

        self.fold_in(base, &clock);
        self.mark_read(state);

        // with nothing deferred, the snapshot under the current DEK is the
        // only data object left, so retired DEKs have no referents
        let mut purged_deks = Vec::new();
        if deferred == 0 && stray == 0 {
            let current = self.header().current()?.0;
            let retired: Vec<DekId> = self
                .header()
                .state()
                .deks()
                .filter(|(id, record)| record.state == DekState::Retired && *id != current)
                .map(|(id, _)| id)
                .collect();
            for id in retired {
                self.header_mut().mark_purgeable(id);
                purged_deks.push(id);
            }
            if !purged_deks.is_empty() {
                self.write_header().await?;
            }
        }

        info!(
            state = %state,
            merged_states,
            folded_ops = folded_names.len(),
            removed,
            deferred,
            purged = purged_deks.len(),
            "compaction complete"
        );
        Ok(Compaction {
            state,
            merged_states,
            folded_ops: folded_names.len(),
            removed,
            deferred,
            purged_deks,
        })
    }
}
