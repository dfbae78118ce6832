//! Round composition tests: reclaimed work first, never more than a batch.

use super::harness::{Behavior, MockStore, RecordingHandler, GROUP, STREAM};
use crate::{Consumer, ConsumerConfig, StreamStore};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn consumer(store: &Arc<MockStore>, config: ConsumerConfig) -> Consumer<MockStore, RecordingHandler> {
    Consumer::new(
        store.clone(),
        Arc::new(RecordingHandler::new(Behavior::Succeed)),
        config.with_group(GROUP).with_consumer_name("me"),
    )
    .unwrap()
}

/// Put `n` entries in another consumer's pending list, idle for `idle`.
async fn abandon(store: &MockStore, n: usize, idle: Duration) -> Vec<String> {
    for i in 0..n {
        store.push(&format!("abandoned-{}", i));
    }
    let ids: Vec<String> = store
        .read_group(STREAM, GROUP, "dead", n, None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    store.backdate_all(idle);
    ids
}

/// Scenario A: 3 stale pending + 2 new with a batch of 5 yields exactly 5.
#[tokio::test]
async fn reclaimed_and_fetched_fill_one_batch() {
    let store = Arc::new(MockStore::with_group(GROUP));
    let abandoned = abandon(&store, 3, Duration::from_secs(5)).await;
    let fresh = vec![store.push("new-0"), store.push("new-1")];

    let consumer = consumer(
        &store,
        ConsumerConfig::new(STREAM)
            .with_batch_size(5)
            .with_idle_threshold(Duration::from_secs(1)),
    );
    let batch = consumer.poll_round().await.unwrap();

    assert_eq!(batch.len(), 5);
    let ids: Vec<&str> = batch.iter().map(|m| m.id.as_str()).collect();
    let expected: Vec<&str> = abandoned.iter().chain(fresh.iter()).map(String::as_str).collect();
    assert_eq!(ids, expected, "reclaimed messages precede fetched ones");

    for message in &batch[..3] {
        assert_eq!(message.delivery_count, 2);
    }
    for message in &batch[3..] {
        assert_eq!(message.delivery_count, 1);
    }
}

#[tokio::test]
async fn full_reclaim_skips_the_fetch() {
    let store = Arc::new(MockStore::with_group(GROUP));
    abandon(&store, 10, Duration::from_secs(5)).await;
    store.push("new");
    let reads_before = store.read_calls();

    let consumer = consumer(
        &store,
        ConsumerConfig::new(STREAM)
            .with_batch_size(5)
            .with_idle_threshold(Duration::from_secs(1)),
    );
    let batch = consumer.poll_round().await.unwrap();

    assert_eq!(batch.len(), 5);
    assert!(batch.iter().all(|m| m.delivery_count == 2));
    assert_eq!(store.read_calls(), reads_before, "no budget left for new entries");
}

#[tokio::test]
async fn batch_bound_holds_every_round() {
    let store = Arc::new(MockStore::with_group(GROUP));
    abandon(&store, 2, Duration::from_secs(5)).await;
    for i in 0..7 {
        store.push(&format!("new-{}", i));
    }

    let consumer = consumer(
        &store,
        ConsumerConfig::new(STREAM)
            .with_batch_size(3)
            .with_idle_threshold(Duration::from_secs(1))
            .with_block_timeout(Duration::from_millis(10)),
    );

    let mut total = 0;
    for _ in 0..6 {
        let batch = consumer.poll_round().await.unwrap();
        assert!(batch.len() <= 3, "round produced {} messages", batch.len());
        total += batch.len();
    }
    assert_eq!(total, 9);
}

#[tokio::test]
async fn reclaimed_work_is_not_delayed_by_blocking_read() {
    let store = Arc::new(MockStore::with_group(GROUP));
    abandon(&store, 1, Duration::from_secs(5)).await;

    let consumer = consumer(
        &store,
        ConsumerConfig::new(STREAM)
            .with_batch_size(5)
            .with_idle_threshold(Duration::from_secs(1))
            .with_block_timeout(Duration::from_secs(5)),
    );

    let start = Instant::now();
    let batch = consumer.poll_round().await.unwrap();

    assert_eq!(batch.len(), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn round_errors_propagate_to_caller() {
    let store = Arc::new(MockStore::with_group(GROUP));
    store.fail_next_reads(1);

    let consumer = consumer(&store, ConsumerConfig::new(STREAM));
    assert!(consumer.poll_round().await.is_err());
}
