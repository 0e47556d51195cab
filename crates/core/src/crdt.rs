//! The abstract CRDT contract and causality tracking.
//!
//! The concrete replicated data type is supplied by the caller; this layer
//! only requires the standard op/state capabilities and enough causal
//! metadata to order ops deterministically. `merge` must be a join:
//! commutative, associative, and idempotent.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Contract every synchronized data type must satisfy.
pub trait Crdt:
    Clone + Debug + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Incremental change record for this type.
    type Op: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Apply a single op to this state.
    fn apply(&mut self, op: Self::Op);

    /// Join another full state into this one.
    fn merge(&mut self, other: Self);
}

/// Logical timestamp of one op: the `counter`-th op produced by `actor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    /// Device that produced the op
    pub actor: Uuid,
    /// 1-based per-actor sequence number
    pub counter: u64,
}

/// Per-actor high-water marks over observed ops.
///
/// Backed by a `BTreeMap` so serialization is deterministic: two devices
/// holding the same clock encode identical bytes, which the content-hash
/// store relies on to deduplicate identical compaction results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector(BTreeMap<Uuid, u64>);

impl VersionVector {
    /// Highest counter observed for `actor` (0 if none).
    pub fn get(&self, actor: Uuid) -> u64 {
        self.0.get(&actor).copied().unwrap_or(0)
    }

    /// Record an observed dot.
    pub fn advance(&mut self, dot: Dot) {
        let entry = self.0.entry(dot.actor).or_insert(0);
        *entry = (*entry).max(dot.counter);
    }

    /// Whether this clock has already observed `dot`.
    pub fn contains(&self, dot: Dot) -> bool {
        self.get(dot.actor) >= dot.counter
    }

    /// Whether this clock has observed everything `other` has.
    pub fn dominates(&self, other: &VersionVector) -> bool {
        other
            .0
            .iter()
            .all(|(actor, counter)| self.get(*actor) >= *counter)
    }

    /// Whether an op with this dot and dependency clock can be applied now.
    ///
    /// The op must be the next op from its actor, and every op its producer
    /// had observed must already be folded in.
    pub fn admits(&self, dot: Dot, deps: &VersionVector) -> bool {
        self.get(dot.actor) + 1 == dot.counter && self.dominates(deps)
    }

    /// Join another clock into this one (pointwise max).
    pub fn merge(&mut self, other: &VersionVector) {
        for (actor, counter) in &other.0 {
            let entry = self.0.entry(*actor).or_insert(0);
            *entry = (*entry).max(*counter);
        }
    }

    /// Iterate over (actor, counter) pairs in actor order.
    pub fn iter(&self) -> impl Iterator<Item = (Uuid, u64)> + '_ {
        self.0.iter().map(|(a, c)| (*a, *c))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dot(actor: Uuid, counter: u64) -> Dot {
        Dot { actor, counter }
    }

    #[test]
    fn test_advance_and_contains() {
        let actor = Uuid::new_v4();
        let mut clock = VersionVector::default();

        assert!(!clock.contains(dot(actor, 1)));
        clock.advance(dot(actor, 2));
        assert!(clock.contains(dot(actor, 1)));
        assert!(clock.contains(dot(actor, 2)));
        assert!(!clock.contains(dot(actor, 3)));

        // advancing backwards never regresses
        clock.advance(dot(actor, 1));
        assert_eq!(clock.get(actor), 2);
    }

    #[test]
    fn test_admits_requires_next_counter() {
        let actor = Uuid::new_v4();
        let mut clock = VersionVector::default();
        let deps = VersionVector::default();

        assert!(clock.admits(dot(actor, 1), &deps));
        assert!(!clock.admits(dot(actor, 2), &deps));

        clock.advance(dot(actor, 1));
        assert!(!clock.admits(dot(actor, 1), &deps));
        assert!(clock.admits(dot(actor, 2), &deps));
    }

    #[test]
    fn test_admits_requires_dependencies() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut deps = VersionVector::default();
        deps.advance(dot(b, 3));

        let mut clock = VersionVector::default();
        assert!(!clock.admits(dot(a, 1), &deps));

        clock.advance(dot(b, 3));
        assert!(clock.admits(dot(a, 1), &deps));
    }

    #[test]
    fn test_merge_is_pointwise_max_and_idempotent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut left = VersionVector::default();
        left.advance(dot(a, 5));
        left.advance(dot(b, 1));

        let mut right = VersionVector::default();
        right.advance(dot(a, 2));
        right.advance(dot(b, 4));

        let mut merged = left.clone();
        merged.merge(&right);
        assert_eq!(merged.get(a), 5);
        assert_eq!(merged.get(b), 4);

        let mut twice = merged.clone();
        twice.merge(&right);
        assert_eq!(twice, merged);

        // commutative
        let mut other_way = right.clone();
        other_way.merge(&left);
        assert_eq!(other_way, merged);
    }
}
