//! Configuration for a redismq consumer.

use crate::error::{RedisMqError, RedisMqResult};
use std::time::Duration;

/// Default consumer group name.
pub const DEFAULT_GROUP: &str = "group_default";

/// Default stream field holding the message payload.
///
/// The field is a property of the store, see [`RedisStore::connect`](crate::RedisStore::connect).
pub const DEFAULT_PAYLOAD_FIELD: &str = "message";

/// Consumer configuration.
///
/// Everything is supplied at construction. The library never reads the
/// environment; the `redismq` binary maps its CLI flags onto this struct.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Stream key to consume from
    pub stream: String,

    /// Consumer group name
    pub group_name: String,

    /// Consumer name (unique per process instance)
    pub consumer_name: String,

    /// Upper bound on reclaimed + fetched messages per round
    pub batch_size: usize,

    /// Pending entries idle longer than this are reclaimed. Zero disables reclaim.
    pub idle_threshold: Duration,

    /// Messages delivered this many times are given up instead of processed
    pub max_delivery_attempts: u64,

    /// How long a fetch blocks waiting for new entries
    pub block_timeout: Duration,

    /// Size of the handler worker pool
    pub max_concurrent_handlers: usize,

    /// Capacity of the queue between the poll loop and the workers
    pub queue_capacity: usize,

    /// Deadline for a single handler invocation
    pub handler_timeout: Duration,

    /// First delay after a failed round
    pub retry_backoff_base: Duration,

    /// Cap for the round retry delay
    pub retry_backoff_max: Duration,

    /// Consecutive failed rounds before failures are reported as errors
    pub persistent_failure_threshold: u32,
}

impl ConsumerConfig {
    /// Create a config for `stream` with default settings.
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            group_name: DEFAULT_GROUP.to_string(),
            consumer_name: format!("consumer-{}", uuid::Uuid::new_v4()),
            batch_size: 100,
            idle_threshold: Duration::ZERO,
            max_delivery_attempts: 3,
            block_timeout: Duration::from_millis(100),
            max_concurrent_handlers: 16,
            queue_capacity: 100,
            handler_timeout: Duration::from_secs(30),
            retry_backoff_base: Duration::from_millis(100),
            retry_backoff_max: Duration::from_secs(30),
            persistent_failure_threshold: 5,
        }
    }

    pub fn with_group(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = group_name.into();
        self
    }

    pub fn with_consumer_name(mut self, consumer_name: impl Into<String>) -> Self {
        self.consumer_name = consumer_name.into();
        self
    }

    /// Set the batch size. The queue capacity follows it.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self.queue_capacity = batch_size;
        self
    }

    pub fn with_idle_threshold(mut self, idle_threshold: Duration) -> Self {
        self.idle_threshold = idle_threshold;
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u64) -> Self {
        self.max_delivery_attempts = attempts;
        self
    }

    pub fn with_block_timeout(mut self, block_timeout: Duration) -> Self {
        self.block_timeout = block_timeout;
        self
    }

    pub fn with_max_concurrent_handlers(mut self, handlers: usize) -> Self {
        self.max_concurrent_handlers = handlers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_handler_timeout(mut self, handler_timeout: Duration) -> Self {
        self.handler_timeout = handler_timeout;
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry_backoff_base = base;
        self.retry_backoff_max = max;
        self
    }

    /// Whether pending entries are ever reclaimed.
    pub fn reclaim_enabled(&self) -> bool {
        !self.idle_threshold.is_zero()
    }

    /// Check the config for values the consumer cannot run with.
    pub fn validate(&self) -> RedisMqResult<()> {
        if self.stream.is_empty() {
            return Err(RedisMqError::Config("stream must not be empty".to_string()));
        }
        if self.group_name.is_empty() {
            return Err(RedisMqError::Config("group_name must not be empty".to_string()));
        }
        if self.consumer_name.is_empty() {
            return Err(RedisMqError::Config(
                "consumer_name must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RedisMqError::Config("batch_size must be > 0".to_string()));
        }
        // BLOCK 0 means "forever" to Redis, which would make shutdown unresponsive
        if self.block_timeout.as_millis() == 0 {
            return Err(RedisMqError::Config(
                "block_timeout must be at least 1ms".to_string(),
            ));
        }
        if self.max_concurrent_handlers == 0 {
            return Err(RedisMqError::Config(
                "max_concurrent_handlers must be > 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(RedisMqError::Config("queue_capacity must be > 0".to_string()));
        }
        if self.handler_timeout.is_zero() {
            return Err(RedisMqError::Config("handler_timeout must be > 0".to_string()));
        }
        Ok(())
    }
}
