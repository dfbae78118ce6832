//! redismq: at-least-once consumer-group client for Redis Streams.
//!
//! Turns the raw stream primitives (XREADGROUP, XPENDING, XCLAIM, XACK, XDEL)
//! into a processing loop that recovers work abandoned by dead consumers and
//! gives up on messages after a bounded number of deliveries.
//!
//! # Core Invariants
//!
//! 1. **At-Least-Once**: an entry leaves the stream only after its handler
//!    succeeded or it was given up
//! 2. **Bounded Retry**: a failing entry is redelivered until its delivery
//!    count reaches `max_delivery_attempts`, then given up
//! 3. **Bounded Rounds**: reclaimed + fetched messages never exceed `batch_size`
//! 4. **Atomic Finalize**: XACK and XDEL are applied together or not at all
//!
//! # Architecture
//!
//! ```text
//!            ┌─ Reclaimer (XPENDING + XCLAIM) ─┐
//! Stream ────┤                                 ├──▶ Dispatcher ──▶ workers
//!            └─ Fetcher   (XREADGROUP >)   ────┘                      │
//!     ▲                                                    DeliveryPolicy
//!     └──────────────── XACK + XDEL (Acknowledger) ◀──────────────────┘
//! ```

pub mod ack;
pub mod backoff;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod group;
pub mod handler;
pub mod message;
pub mod policy;
pub mod reclaim;
pub mod redis_store;
pub mod store;

#[cfg(test)]
mod tests;

pub use ack::Acknowledger;
pub use config::ConsumerConfig;
pub use consumer::Consumer;
pub use dispatch::{Dispatcher, InFlight};
pub use error::{RedisMqError, RedisMqResult};
pub use fetch::Fetcher;
pub use group::GroupCoordinator;
pub use handler::{HandlerContext, MessageHandler};
pub use message::{ClaimedEntry, Message, PendingRecord, StreamEntry};
pub use policy::{DeliveryPolicy, Disposition, Outcome, PendingReason};
pub use reclaim::Reclaimer;
pub use redis_store::RedisStore;
pub use store::{GroupStatus, StreamStore};
