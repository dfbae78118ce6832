//! Main consumer loop orchestration.

use crate::ack::Acknowledger;
use crate::backoff::RetryBackoff;
use crate::config::ConsumerConfig;
use crate::dispatch::{Dispatcher, InFlight};
use crate::error::{RedisMqError, RedisMqResult};
use crate::fetch::Fetcher;
use crate::group::GroupCoordinator;
use crate::handler::MessageHandler;
use crate::message::Message;
use crate::policy::DeliveryPolicy;
use crate::reclaim::Reclaimer;
use crate::store::StreamStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A reliable consumer-group member.
///
/// Orchestrates the flow of entries from the stream to the handler:
/// reclaimed entries first, then new ones, never more than `batch_size` per
/// round.
pub struct Consumer<S, H> {
    config: Arc<ConsumerConfig>,
    store: Arc<S>,
    handler: Arc<H>,
    coordinator: GroupCoordinator<S>,
    reclaimer: Reclaimer<S>,
    fetcher: Fetcher<S>,
    in_flight: InFlight,
}

impl<S: StreamStore, H: MessageHandler> Consumer<S, H> {
    /// Create a new Consumer. Fails if the config is invalid.
    pub fn new(store: Arc<S>, handler: Arc<H>, config: ConsumerConfig) -> RedisMqResult<Self> {
        config.validate()?;

        if config.reclaim_enabled() && config.handler_timeout > config.idle_threshold {
            warn!(
                handler_timeout_ms = config.handler_timeout.as_millis() as u64,
                idle_threshold_ms = config.idle_threshold.as_millis() as u64,
                "Handler timeout exceeds idle threshold; other consumers may reclaim messages still being handled"
            );
        }

        let in_flight = InFlight::new();
        let coordinator = GroupCoordinator::new(store.clone());
        let reclaimer = Reclaimer::new(
            store.clone(),
            &config.stream,
            &config.group_name,
            &config.consumer_name,
            in_flight.clone(),
        );
        let fetcher = Fetcher::new(
            store.clone(),
            &config.stream,
            &config.group_name,
            &config.consumer_name,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            handler,
            coordinator,
            reclaimer,
            fetcher,
            in_flight,
        })
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Entries currently queued or being handled by this consumer.
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Ensure the consumer group exists.
    pub async fn ensure_group(&self) -> RedisMqResult<()> {
        self.coordinator
            .ensure_group(&self.config.stream, &self.config.group_name)
            .await
    }

    /// Collect one round of work: reclaimed entries followed by new ones.
    ///
    /// The fetch only blocks when nothing was reclaimed, so recovery work is
    /// never held back by the block timeout.
    pub async fn poll_round(&self) -> RedisMqResult<Vec<Message>> {
        let claimed = self
            .reclaimer
            .reclaim(self.config.idle_threshold, self.config.batch_size)
            .await?;

        let remaining = self.config.batch_size.saturating_sub(claimed.len());
        let block = claimed.is_empty().then_some(self.config.block_timeout);

        let mut batch: Vec<Message> = claimed.into_iter().map(Message::reclaimed).collect();

        if remaining > 0 {
            let fetched = self.fetcher.fetch(remaining, block).await?;
            batch.extend(fetched.into_iter().map(Message::first_delivery));
        }

        Ok(batch)
    }

    /// Run the consumer until `shutdown` is cancelled.
    ///
    /// Startup fails if the group cannot be ensured. After that, round errors
    /// are retried with backoff, and a group that disappears (stream deleted
    /// or evicted) is created again; the loop only ends on cancellation. On the
    /// way out no new entries are read or claimed, queued messages stay
    /// pending, and running handler attempts finish or hit their deadline.
    pub async fn run(&self, shutdown: CancellationToken) -> RedisMqResult<()> {
        self.ensure_group().await?;

        info!(
            stream = %self.config.stream,
            group = %self.config.group_name,
            consumer = %self.config.consumer_name,
            batch_size = self.config.batch_size,
            workers = self.config.max_concurrent_handlers,
            "Starting consumer loop"
        );

        let policy = Arc::new(DeliveryPolicy::new(
            self.handler.clone(),
            Acknowledger::new(self.store.clone(), &self.config.stream, &self.config.group_name),
            self.config.max_delivery_attempts,
            self.config.handler_timeout,
            shutdown.clone(),
        ));
        let dispatcher = Dispatcher::start(
            policy,
            self.config.max_concurrent_handlers,
            self.config.queue_capacity,
            self.in_flight.clone(),
            shutdown.clone(),
        );

        let result = self.poll_loop(&dispatcher, &shutdown).await;

        info!(consumer = %self.config.consumer_name, "Stopping consumer, waiting for handlers");
        dispatcher.close().await;
        info!(consumer = %self.config.consumer_name, "Consumer stopped");

        result
    }

    async fn poll_loop(
        &self,
        dispatcher: &Dispatcher,
        shutdown: &CancellationToken,
    ) -> RedisMqResult<()> {
        let mut backoff = RetryBackoff::new(
            self.config.retry_backoff_base,
            self.config.retry_backoff_max,
            self.config.persistent_failure_threshold,
        );

        loop {
            let round = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                round = self.poll_round() => round,
            };

            let batch = match round {
                Ok(batch) => {
                    backoff.reset();
                    batch
                }
                Err(e) if !e.is_transient() => {
                    error!(error = %e, "Unrecoverable error polling stream");
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff.record_failure();
                    if backoff.is_persistent() {
                        error!(
                            error = %e,
                            consecutive_failures = backoff.consecutive_failures(),
                            retry_in_ms = delay.as_millis() as u64,
                            "Polling keeps failing"
                        );
                    } else {
                        warn!(
                            error = %e,
                            consecutive_failures = backoff.consecutive_failures(),
                            retry_in_ms = delay.as_millis() as u64,
                            "Poll round failed, backing off"
                        );
                    }

                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }

                    if e.needs_reconnect() {
                        if let Err(reconnect_err) = self.store.reconnect().await {
                            warn!(error = %reconnect_err, "Failed to reconnect to store");
                        }
                    }
                    if e.needs_group() {
                        info!(group = %self.config.group_name, "Consumer group missing, recreating");
                        if let Err(group_err) = self.ensure_group().await {
                            warn!(error = %group_err, "Failed to recreate consumer group");
                        }
                    }
                    continue;
                }
            };

            if batch.is_empty() {
                continue;
            }

            debug!(count = batch.len(), "Dispatching batch");

            let dispatched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                dispatched = dispatcher.dispatch(batch) => dispatched,
            };

            match dispatched {
                Ok(_) => {}
                Err(RedisMqError::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}
