//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::collections::BTreeSet;

use coffer::{Crdt, Feed, Kind, ObjectName, ObjectStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimal replicated type for exercising the feed: a grow-only set of
/// string tags. Set union is the join, insertion is the op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSet(pub BTreeSet<String>);

impl Crdt for TagSet {
    type Op = String;

    fn apply(&mut self, op: String) {
        self.0.insert(op);
    }

    fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub async fn memory_store() -> ObjectStore {
    ObjectStore::memory().await.unwrap()
}

pub async fn create_feed(store: &ObjectStore, password: &str) -> Feed<TagSet> {
    init_logging();
    Feed::create(store.clone(), Uuid::new_v4(), password)
        .await
        .unwrap()
}

pub async fn open_feed(store: &ObjectStore, password: &str) -> Feed<TagSet> {
    init_logging();
    Feed::open(store.clone(), Uuid::new_v4(), password)
        .await
        .unwrap()
}

/// Tags currently visible in a feed, in set order.
pub fn tags(feed: &Feed<TagSet>) -> Vec<String> {
    feed.state().0.iter().cloned().collect()
}

/// Copy selected objects between stores, simulating a sync tool that has
/// only transferred part of a namespace so far.
pub async fn copy_objects(from: &ObjectStore, to: &ObjectStore, kind: Kind, names: &[ObjectName]) {
    for name in names {
        let bytes = from.get(kind, name).await.unwrap();
        to.put(kind, bytes).await.unwrap();
    }
}

/// Copy an entire namespace between stores.
pub async fn copy_namespace(from: &ObjectStore, to: &ObjectStore, kind: Kind) {
    let names = from.list(kind).await.unwrap();
    copy_objects(from, to, kind, &names).await;
}
