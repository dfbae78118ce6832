//! Recovery of entries abandoned by other (or crashed) consumers.

use crate::dispatch::InFlight;
use crate::error::RedisMqResult;
use crate::message::ClaimedEntry;
use crate::store::StreamStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Scans the pending list and claims entries that have been idle too long.
pub struct Reclaimer<S> {
    store: Arc<S>,
    stream: String,
    group: String,
    consumer: String,
    in_flight: InFlight,
}

impl<S: StreamStore> Reclaimer<S> {
    pub fn new(
        store: Arc<S>,
        stream: &str,
        group: &str,
        consumer: &str,
        in_flight: InFlight,
    ) -> Self {
        Self {
            store,
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            in_flight,
        }
    }

    /// Claim up to `limit` pending entries idle for longer than `idle_threshold`.
    ///
    /// A zero threshold disables reclaiming. Only records already idle past the
    /// threshold are listed, so fresh deliveries never crowd stale ones out of
    /// the window. Entries this process is still handling are never claimed back
    /// from itself. The claim re-checks idleness on the server, so entries taken
    /// by another consumer in the meantime are simply absent from the result.
    pub async fn reclaim(
        &self,
        idle_threshold: Duration,
        limit: usize,
    ) -> RedisMqResult<Vec<ClaimedEntry>> {
        if idle_threshold.is_zero() || limit == 0 {
            return Ok(Vec::new());
        }

        // Locally in-flight records can pass the idle filter too; over-fetch by
        // their number so they do not shrink the window
        let window = limit.saturating_add(self.in_flight.len());
        let pending = self
            .store
            .list_pending(&self.stream, &self.group, idle_threshold, window)
            .await?;

        let stale: HashMap<String, u64> = pending
            .into_iter()
            .filter(|record| record.idle > idle_threshold)
            .filter(|record| !self.in_flight.contains(&record.id))
            .take(limit)
            .map(|record| (record.id, record.delivery_count))
            .collect();

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<String> = stale.keys().cloned().collect();
        ids.sort_by(|a, b| compare_entry_ids(a, b));

        let entries = self
            .store
            .claim(&self.stream, &self.group, &self.consumer, idle_threshold, &ids)
            .await?;

        let claimed: Vec<ClaimedEntry> = entries
            .into_iter()
            .filter_map(|entry| {
                // XCLAIM bumps the delivery counter by one
                let delivery_count = stale.get(&entry.id)?.saturating_add(1);
                Some(ClaimedEntry {
                    entry,
                    delivery_count,
                })
            })
            .collect();

        debug!(
            stream = %self.stream,
            candidates = ids.len(),
            claimed = claimed.len(),
            "Reclaimed idle entries"
        );

        Ok(claimed)
    }
}

/// Order stream IDs (`<ms>-<seq>`) numerically, falling back to string order.
pub(crate) fn compare_entry_ids(a: &str, b: &str) -> std::cmp::Ordering {
    fn parts(id: &str) -> Option<(u64, u64)> {
        let (ms, seq) = id.split_once('-')?;
        Some((ms.parse().ok()?, seq.parse().ok()?))
    }

    match (parts(a), parts(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_compare_entry_ids_is_numeric() {
        assert_eq!(compare_entry_ids("9-0", "10-0"), Ordering::Less);
        assert_eq!(compare_entry_ids("10-2", "10-10"), Ordering::Less);
        assert_eq!(compare_entry_ids("5-1", "5-1"), Ordering::Equal);
    }
}
