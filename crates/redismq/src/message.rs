//! Stream entries, pending records and the messages handed to handlers.

use std::time::Duration;

/// An entry read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// The Redis entry ID (e.g., "1234567890-0").
    pub id: String,
    /// The payload string.
    pub payload: String,
}

/// Consumer-group bookkeeping for an entry delivered but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub id: String,
    /// Time since the entry was last delivered or claimed.
    pub idle: Duration,
    /// Number of times the entry has been delivered to any consumer of the group.
    pub delivery_count: u64,
}

/// An entry this consumer just took over from the pending list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedEntry {
    pub entry: StreamEntry,
    /// Delivery count after the claim was applied.
    pub delivery_count: u64,
}

/// A message handed to a [`MessageHandler`](crate::MessageHandler).
///
/// Built fresh every round and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub payload: String,
    pub delivery_count: u64,
}

impl Message {
    /// A message fetched for the first time. A first delivery already counts as one.
    pub fn first_delivery(entry: StreamEntry) -> Self {
        Self {
            id: entry.id,
            payload: entry.payload,
            delivery_count: 1,
        }
    }

    /// A message recovered from another (or a previous) consumer.
    pub fn reclaimed(claimed: ClaimedEntry) -> Self {
        Self {
            id: claimed.entry.id,
            payload: claimed.entry.payload,
            delivery_count: claimed.delivery_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delivery_counts_as_one() {
        let msg = Message::first_delivery(StreamEntry {
            id: "1-0".to_string(),
            payload: "hello".to_string(),
        });
        assert_eq!(msg.id, "1-0");
        assert_eq!(msg.payload, "hello");
        assert_eq!(msg.delivery_count, 1);
    }

    #[test]
    fn test_reclaimed_keeps_claimed_count() {
        let msg = Message::reclaimed(ClaimedEntry {
            entry: StreamEntry {
                id: "7-0".to_string(),
                payload: "retry me".to_string(),
            },
            delivery_count: 4,
        });
        assert_eq!(msg.delivery_count, 4);
    }
}
