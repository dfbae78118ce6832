//! Error types for redismq.

use thiserror::Error;

/// redismq error type.
#[derive(Error, Debug)]
pub enum RedisMqError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// IO error (log files, sockets)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected reply shape from the store
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The consumer has been shut down
    #[error("Consumer is shutting down")]
    Shutdown,
}

impl RedisMqError {
    /// Whether a failed round may succeed if simply tried again.
    ///
    /// Configuration problems never fix themselves; everything the store
    /// reports is treated as transient so the loop keeps retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            RedisMqError::Redis(_) | RedisMqError::Io(_) | RedisMqError::Protocol(_) => true,
            RedisMqError::Config(_) | RedisMqError::Shutdown => false,
        }
    }

    /// Whether the store connection should be re-established before retrying.
    pub fn needs_reconnect(&self) -> bool {
        match self {
            RedisMqError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            _ => false,
        }
    }

    /// Whether the consumer group is gone, e.g. because the stream key was
    /// deleted or evicted, and has to be created again.
    pub fn needs_group(&self) -> bool {
        match self {
            RedisMqError::Redis(e) => {
                e.code() == Some("NOGROUP") || e.to_string().contains("NOGROUP")
            }
            _ => false,
        }
    }
}

/// Result type for redismq operations.
pub type RedisMqResult<T> = Result<T, RedisMqError>;
