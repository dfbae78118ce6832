//! Scenario tests for the redismq consumer.
//!
//! - `harness.rs` - MockStore, RecordingHandler and helpers
//! - `dispatch.rs` - worker hand-off and in-flight dedup
//! - `group.rs`   - group bootstrap idempotence
//! - `reclaim.rs` - idle filtering, claim ownership, delivery counts
//! - `fetch.rs`   - blocking reads, timeouts, cursor semantics
//! - `round.rs`   - round composition and the batch bound
//! - `policy.rs`  - process / give-up decisions and finalize failures
//! - `runtime.rs` - the full loop: concurrency, retry, backoff, group recovery, shutdown

mod fetch;
mod group;
mod round;
