//! The contract between the consumer and application code.

use crate::message::Message;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-invocation context handed to a handler.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    deadline: Instant,
    shutdown: CancellationToken,
}

impl HandlerContext {
    pub fn new(deadline: Instant, shutdown: CancellationToken) -> Self {
        Self { deadline, shutdown }
    }

    /// The point after which the invocation is abandoned.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the consumer has been asked to stop.
    ///
    /// Running invocations are not cut short on shutdown; long handlers may
    /// use this to wrap up early.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Application logic invoked for each delivered message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process a message.
    ///
    /// `Ok` finalizes the entry. An error, a panic or running past the
    /// deadline leaves it pending so it is redelivered after the idle
    /// threshold with a higher delivery count.
    async fn process(&self, ctx: &HandlerContext, message: &Message) -> anyhow::Result<()>;

    /// Called instead of [`process`](Self::process) once a message has used up
    /// its delivery attempts.
    ///
    /// Best effort: the entry is finalized afterwards no matter how this goes.
    async fn give_up(&self, ctx: &HandlerContext, message: &Message);
}
