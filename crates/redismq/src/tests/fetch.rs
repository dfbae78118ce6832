//! Fetch tests.

use super::harness::{MockStore, GROUP, STREAM};
use crate::Fetcher;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fetcher(store: &Arc<MockStore>) -> Fetcher<MockStore> {
    Fetcher::new(store.clone(), STREAM, GROUP, "me")
}

/// Scenario C: nothing available, the read times out empty.
#[tokio::test]
async fn empty_stream_times_out_without_error() {
    let store = Arc::new(MockStore::with_group(GROUP));

    let start = Instant::now();
    let entries = fetcher(&store)
        .fetch(10, Some(Duration::from_millis(100)))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(entries.is_empty());
    assert!(elapsed >= Duration::from_millis(90), "should block: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(1), "should not hang: {:?}", elapsed);
}

#[tokio::test]
async fn blocked_fetch_wakes_on_append() {
    let store = Arc::new(MockStore::with_group(GROUP));
    let producer = store.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        producer.push("late");
    });

    let start = Instant::now();
    let entries = fetcher(&store)
        .fetch(10, Some(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, "late");
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn fetched_entries_are_never_fetched_again() {
    let store = Arc::new(MockStore::with_group(GROUP));
    store.push("a");
    store.push("b");
    let fetcher = fetcher(&store);

    let first = fetcher.fetch(10, None).await.unwrap();
    let second = fetcher.fetch(10, None).await.unwrap();

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    // Still pending until finalized
    assert_eq!(store.pending_ids().len(), 2);
}

#[tokio::test]
async fn fetch_respects_count() {
    let store = Arc::new(MockStore::with_group(GROUP));
    for i in 0..5 {
        store.push(&format!("m{}", i));
    }

    let entries = fetcher(&store).fetch(2, None).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].payload, "m0");
    assert_eq!(entries[1].payload, "m1");
}

#[tokio::test]
async fn zero_count_does_not_touch_the_store() {
    let store = Arc::new(MockStore::with_group(GROUP));
    store.push("a");

    let entries = fetcher(&store).fetch(0, None).await.unwrap();
    assert!(entries.is_empty());
    assert_eq!(store.read_calls(), 0);
}

#[tokio::test]
async fn read_errors_propagate() {
    let store = Arc::new(MockStore::with_group(GROUP));
    store.fail_next_reads(1);

    assert!(fetcher(&store).fetch(1, None).await.is_err());
    assert!(fetcher(&store).fetch(1, None).await.is_ok());
}
