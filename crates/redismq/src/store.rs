//! The log-store operations the consumer is built on.
//!
//! [`RedisStore`](crate::RedisStore) speaks these against Redis Streams; the
//! test harness provides an in-memory implementation with the same
//! consumer-group semantics.

use crate::error::RedisMqResult;
use crate::message::{PendingRecord, StreamEntry};
use async_trait::async_trait;
use std::time::Duration;

/// Outcome of a group creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Created,
    AlreadyExists,
}

/// Consumer-group operations over an append-only stream.
///
/// "No data" replies (read timeout, nothing to claim) are returned as empty
/// vectors, never as errors.
#[async_trait]
pub trait StreamStore: Send + Sync + 'static {
    /// XGROUP CREATE anchored at the stream origin, creating the stream if needed.
    async fn create_group(&self, stream: &str, group: &str) -> RedisMqResult<GroupStatus>;

    /// XREADGROUP with the `>` cursor: only entries never delivered to the group.
    ///
    /// `block` of `None` returns immediately.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Option<Duration>,
    ) -> RedisMqResult<Vec<StreamEntry>>;

    /// XPENDING over the whole ID range, oldest first, keeping only records
    /// idle for at least `min_idle`.
    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        min_idle: Duration,
        count: usize,
    ) -> RedisMqResult<Vec<PendingRecord>>;

    /// XCLAIM the given entries for `consumer` if still idle for at least `min_idle`.
    ///
    /// Returns only the entries actually transferred.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[String],
    ) -> RedisMqResult<Vec<StreamEntry>>;

    /// XACK and XDEL as one atomic unit.
    async fn ack_and_delete(&self, stream: &str, group: &str, id: &str) -> RedisMqResult<()>;

    /// XADD a payload, returning the assigned entry ID.
    async fn append(&self, stream: &str, payload: &str) -> RedisMqResult<String>;

    /// Re-establish the underlying connection after a transport failure.
    async fn reconnect(&self) -> RedisMqResult<()> {
        Ok(())
    }
}
