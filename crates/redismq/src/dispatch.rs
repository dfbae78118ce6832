//! Hands batches of messages to a fixed pool of handler workers.
//!
//! ```text
//! poll loop ──▶ bounded queue ──▶ worker 1..N ──▶ DeliveryPolicy
//! ```
//!
//! Each queued message holds an [`InFlightGuard`] until its delivery attempt
//! finishes, so the same entry is never handled twice at once in this process.

use crate::error::{RedisMqError, RedisMqResult};
use crate::message::Message;
use crate::policy::DeliveryPolicy;
use crate::store::StreamStore;
use crate::handler::MessageHandler;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// IDs of entries queued or being handled by this process.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` in flight, or `None` if it already is.
    pub fn try_acquire(&self, id: &str) -> Option<InFlightGuard> {
        if self.ids.lock().insert(id.to_string()) {
            Some(InFlightGuard {
                id: id.to_string(),
                ids: self.ids.clone(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}

/// Releases its entry ID from the in-flight set when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    id: String,
    ids: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids.lock().remove(&self.id);
    }
}

struct Delivery {
    message: Message,
    _guard: InFlightGuard,
}

/// Worker pool fed by a bounded queue.
pub struct Dispatcher {
    sender: Option<mpsc::Sender<Delivery>>,
    in_flight: InFlight,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn `workers` handler tasks sharing a queue of `capacity` messages.
    ///
    /// Workers stop picking up queued messages once `shutdown` is cancelled;
    /// an attempt already running finishes or hits its deadline.
    pub fn start<S: StreamStore, H: MessageHandler>(
        policy: Arc<DeliveryPolicy<S, H>>,
        workers: usize,
        capacity: usize,
        in_flight: InFlight,
        shutdown: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    receiver.clone(),
                    policy.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        Self {
            sender: Some(sender),
            in_flight,
            workers,
        }
    }

    /// Queue a batch in order, waiting for queue space as needed.
    ///
    /// Messages already in flight are skipped. Returns how many were queued.
    pub async fn dispatch(&self, batch: Vec<Message>) -> RedisMqResult<usize> {
        let sender = self.sender.as_ref().ok_or(RedisMqError::Shutdown)?;
        let mut queued = 0;

        for message in batch {
            let Some(guard) = self.in_flight.try_acquire(&message.id) else {
                debug!(message_id = %message.id, "Message already in flight, skipping");
                continue;
            };

            sender
                .send(Delivery {
                    message,
                    _guard: guard,
                })
                .await
                .map_err(|_| RedisMqError::Shutdown)?;
            queued += 1;
        }

        Ok(queued)
    }

    /// Close the queue and wait for every worker to exit.
    pub async fn close(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!(error = %e, "Handler worker ended abnormally");
            }
        }
    }
}

async fn worker_loop<S: StreamStore, H: MessageHandler>(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Delivery>>>,
    policy: Arc<DeliveryPolicy<S, H>>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            delivery = async { receiver.lock().await.recv().await } => delivery,
        };

        let Some(delivery) = next else {
            break;
        };

        policy.handle(&delivery.message).await;
    }

    debug!(worker_id, "Handler worker stopped");
}
