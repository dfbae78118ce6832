//! Group bootstrap tests.

use super::harness::{Behavior, MockStore, RecordingHandler, GROUP, STREAM};
use crate::{Consumer, ConsumerConfig, GroupCoordinator, RedisMqError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn ensure_group_creates_missing_group() {
    let store = Arc::new(MockStore::new());
    let coordinator = GroupCoordinator::new(store.clone());

    coordinator.ensure_group(STREAM, GROUP).await.unwrap();

    assert!(store.has_group(GROUP));
}

#[tokio::test]
async fn ensure_group_twice_never_errors() {
    let store = Arc::new(MockStore::new());
    let coordinator = GroupCoordinator::new(store.clone());

    coordinator.ensure_group(STREAM, GROUP).await.unwrap();
    coordinator.ensure_group(STREAM, GROUP).await.unwrap();

    assert!(store.has_group(GROUP));
}

#[tokio::test]
async fn group_sees_entries_appended_before_it_existed() {
    let store = Arc::new(MockStore::new());
    let id = store.push("historical");

    let config = ConsumerConfig::new(STREAM).with_group(GROUP);
    let consumer = Consumer::new(
        store.clone(),
        Arc::new(RecordingHandler::new(Behavior::Succeed)),
        config,
    )
    .unwrap();
    consumer.ensure_group().await.unwrap();

    let batch = consumer.poll_round().await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
}

#[tokio::test]
async fn other_store_errors_are_fatal_to_startup() {
    let store = Arc::new(MockStore::new());
    store.fail_create_group();

    let coordinator = GroupCoordinator::new(store.clone());
    let result = coordinator.ensure_group(STREAM, GROUP).await;
    assert!(matches!(result, Err(RedisMqError::Redis(_))));

    let consumer = Consumer::new(
        store.clone(),
        Arc::new(RecordingHandler::new(Behavior::Succeed)),
        ConsumerConfig::new(STREAM).with_group(GROUP),
    )
    .unwrap();
    let run = consumer.run(CancellationToken::new()).await;
    assert!(run.is_err(), "run must not start without a group");
    assert_eq!(store.read_calls(), 0);
}
