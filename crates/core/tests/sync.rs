//! Multi-device synchronization through a shared store.

mod common;

use coffer::{Feed, Kind, ObjectStore};
use common::TagSet;
use uuid::Uuid;

#[tokio::test]
async fn test_three_devices_converge() {
    let store = common::memory_store().await;

    let mut a = common::create_feed(&store, "pw").await;
    let mut b = common::open_feed(&store, "pw").await;
    let mut c = common::open_feed(&store, "pw").await;

    a.append("ant".to_string()).await.unwrap();
    b.append("bee".to_string()).await.unwrap();
    c.append("cat".to_string()).await.unwrap();
    a.append("asp".to_string()).await.unwrap();

    for feed in [&mut a, &mut b, &mut c] {
        feed.sync().await.unwrap();
    }

    assert_eq!(common::tags(&a), vec!["ant", "asp", "bee", "cat"]);
    assert_eq!(a.state(), b.state());
    assert_eq!(b.state(), c.state());
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let store = common::memory_store().await;

    let mut a = common::create_feed(&store, "pw").await;
    let mut b = common::open_feed(&store, "pw").await;
    a.append("once".to_string()).await.unwrap();

    let first = b.sync().await.unwrap();
    assert_eq!(first, 1);
    let second = b.sync().await.unwrap();
    assert_eq!(second, 0);
    assert_eq!(common::tags(&b), vec!["once"]);
}

#[tokio::test]
async fn test_corrupt_object_skipped_not_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::local(temp_dir.path()).await.unwrap();

    let mut a = common::create_feed(&store, "pw").await;
    let damaged = a.append("lost".to_string()).await.unwrap();
    a.append("kept".to_string()).await.unwrap();

    // bit rot on the sync medium
    let path = temp_dir.path().join("data").join(damaged.to_string());
    tokio::fs::write(&path, b"garbage").await.unwrap();

    // the readable op still comes through
    let b = common::open_feed(&store, "pw").await;
    assert_eq!(common::tags(&b), vec!["kept"]);
}

#[tokio::test]
async fn test_op_deferred_until_dependency_arrives() {
    let origin = common::memory_store().await;
    let shared = common::memory_store().await;

    let mut producer = common::create_feed(&origin, "pw").await;
    let first = producer.append("first".to_string()).await.unwrap();
    let second = producer.append("second".to_string()).await.unwrap();

    // the sync tool has moved the header and only the second op so far
    common::copy_namespace(&origin, &shared, Kind::Header).await;
    common::copy_objects(&origin, &shared, Kind::Data, &[second]).await;

    let mut reader: Feed<TagSet> = Feed::open(shared.clone(), Uuid::new_v4(), "pw")
        .await
        .unwrap();
    assert!(common::tags(&reader).is_empty());

    // nothing was dropped: once the gap fills, both apply in order
    common::copy_objects(&origin, &shared, Kind::Data, &[first]).await;
    reader.sync().await.unwrap();
    assert_eq!(common::tags(&reader), vec!["first", "second"]);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::local(temp_dir.path()).await.unwrap();

    {
        let mut feed = common::create_feed(&store, "pw").await;
        feed.append("persisted".to_string()).await.unwrap();
    }

    let store = ObjectStore::local(temp_dir.path()).await.unwrap();
    let feed = common::open_feed(&store, "pw").await;
    assert_eq!(common::tags(&feed), vec!["persisted"]);
}
