//! Reads entries never delivered to the group before.

use crate::error::RedisMqResult;
use crate::message::StreamEntry;
use crate::store::StreamStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reads new entries through the group's `>` cursor.
///
/// Entries come back through this path exactly once per group; redelivery only
/// ever happens through the [`Reclaimer`](crate::Reclaimer).
pub struct Fetcher<S> {
    store: Arc<S>,
    stream: String,
    group: String,
    consumer: String,
}

impl<S: StreamStore> Fetcher<S> {
    pub fn new(store: Arc<S>, stream: &str, group: &str, consumer: &str) -> Self {
        Self {
            store,
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
        }
    }

    /// Fetch up to `count` new entries, waiting at most `block` for the first one.
    ///
    /// A timeout with nothing available is an empty result, not an error.
    /// `block` of `None` returns whatever is available immediately.
    pub async fn fetch(
        &self,
        count: usize,
        block: Option<Duration>,
    ) -> RedisMqResult<Vec<StreamEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut entries = self
            .store
            .read_group(&self.stream, &self.group, &self.consumer, count, block)
            .await?;
        // The budget is ours to enforce, whatever the store returned
        entries.truncate(count);

        if !entries.is_empty() {
            debug!(stream = %self.stream, count = entries.len(), "Fetched new entries");
        }
        Ok(entries)
    }
}
