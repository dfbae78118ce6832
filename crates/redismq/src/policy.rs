//! Per-message delivery decisions.
//!
//! ```text
//! Delivered ──count < max──▶ Processing ──ok──────────▶ Acknowledged
//!     │                          └──err/timeout/panic──▶ (left pending)
//!     └──count >= max──▶ GivingUp ─────────────────────▶ Acknowledged
//! ```

use crate::ack::Acknowledger;
use crate::handler::{HandlerContext, MessageHandler};
use crate::message::Message;
use crate::store::StreamStore;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Which handler path a delivery takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Process,
    GiveUp,
}

/// Why an entry was left pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingReason {
    HandlerFailed,
    HandlerTimedOut,
    HandlerPanicked,
    FinalizeFailed,
}

/// Final state of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed successfully and finalized.
    Processed,
    /// Given up and finalized.
    GivenUp,
    /// Still pending; eligible for reclaim.
    LeftPending(PendingReason),
}

/// Decides between processing and giving up, runs the handler under a
/// deadline and finalizes the entry when the decision is terminal.
pub struct DeliveryPolicy<S, H> {
    handler: Arc<H>,
    acknowledger: Acknowledger<S>,
    max_delivery_attempts: u64,
    handler_timeout: Duration,
    shutdown: CancellationToken,
}

impl<S: StreamStore, H: MessageHandler> DeliveryPolicy<S, H> {
    pub fn new(
        handler: Arc<H>,
        acknowledger: Acknowledger<S>,
        max_delivery_attempts: u64,
        handler_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            handler,
            acknowledger,
            max_delivery_attempts,
            handler_timeout,
            shutdown,
        }
    }

    pub fn decide(&self, delivery_count: u64) -> Disposition {
        if delivery_count >= self.max_delivery_attempts {
            Disposition::GiveUp
        } else {
            Disposition::Process
        }
    }

    /// Run one delivery attempt to its outcome.
    pub async fn handle(&self, message: &Message) -> Outcome {
        let ctx = HandlerContext::new(
            Instant::now() + self.handler_timeout,
            self.shutdown.clone(),
        );

        let outcome = match self.decide(message.delivery_count) {
            Disposition::GiveUp => {
                self.give_up(&ctx, message).await;
                self.finalize(message, Outcome::GivenUp).await
            }
            Disposition::Process => match self.process(&ctx, message).await {
                Ok(()) => self.finalize(message, Outcome::Processed).await,
                Err(reason) => Outcome::LeftPending(reason),
            },
        };

        debug!(
            message_id = %message.id,
            delivery_count = message.delivery_count,
            outcome = ?outcome,
            "Delivery attempt finished"
        );
        outcome
    }

    async fn process(&self, ctx: &HandlerContext, message: &Message) -> Result<(), PendingReason> {
        let invocation = AssertUnwindSafe(self.handler.process(ctx, message)).catch_unwind();

        match tokio::time::timeout_at(ctx.deadline(), invocation).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => {
                warn!(
                    message_id = %message.id,
                    delivery_count = message.delivery_count,
                    error = %e,
                    "Handler failed, leaving message pending"
                );
                Err(PendingReason::HandlerFailed)
            }
            Ok(Err(_)) => {
                error!(
                    message_id = %message.id,
                    delivery_count = message.delivery_count,
                    "Handler panicked, leaving message pending"
                );
                Err(PendingReason::HandlerPanicked)
            }
            Err(_) => {
                warn!(
                    message_id = %message.id,
                    delivery_count = message.delivery_count,
                    timeout_ms = self.handler_timeout.as_millis() as u64,
                    "Handler timed out, leaving message pending"
                );
                Err(PendingReason::HandlerTimedOut)
            }
        }
    }

    async fn give_up(&self, ctx: &HandlerContext, message: &Message) {
        warn!(
            message_id = %message.id,
            delivery_count = message.delivery_count,
            max_delivery_attempts = self.max_delivery_attempts,
            "Delivery attempts exhausted, giving up"
        );

        let invocation = AssertUnwindSafe(self.handler.give_up(ctx, message)).catch_unwind();

        match tokio::time::timeout_at(ctx.deadline(), invocation).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                error!(message_id = %message.id, "Give-up handler panicked, finalizing anyway");
            }
            Err(_) => {
                warn!(message_id = %message.id, "Give-up handler timed out, finalizing anyway");
            }
        }
    }

    async fn finalize(&self, message: &Message, done: Outcome) -> Outcome {
        match self.acknowledger.finalize(&message.id).await {
            Ok(()) => done,
            Err(e) => {
                // Not data loss: the entry stays pending and comes back via reclaim
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "Failed to finalize message, it remains pending"
                );
                Outcome::LeftPending(PendingReason::FinalizeFailed)
            }
        }
    }
}
