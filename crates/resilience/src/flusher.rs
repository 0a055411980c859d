//! Retry-queue flush cycle.
//!
//! Reads the bearer token and the pending payloads from the store, attempts every
//! payload once, and writes back only the ones that still failed. Delivery is
//! at-least-once: a payload leaves the queue only after the collector accepted it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use bipe_common::config::AppConfig;
use bipe_common::error::AppError;
use bipe_common::store::KvStore;
use bipe_common::types::{JWT_TOKEN_KEY, PendingPayload, RETRY_QUEUE_KEY, RetryQueue};
use bipe_scheduler::run_isolated;

use crate::delivery::PayloadDelivery;

/// How a flush cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No bearer token stored; nothing was read or sent.
    NoToken,
    /// The queue was absent, malformed, or an empty array; nothing was written.
    EmptyQueue,
    /// The queue was processed and the survivors written back.
    Flushed {
        attempted: usize,
        delivered: usize,
        retained: usize,
        /// Payloads left untouched because the cycle deadline passed.
        deferred: usize,
    },
    /// The store could not be read or written; the queue is left as it was.
    Aborted,
}

pub struct RetryQueueFlusher {
    store: Arc<dyn KvStore>,
    delivery: Arc<dyn PayloadDelivery>,
    deadline: Option<Duration>,
    // Held across the read-modify-write so overlapping triggers never race on the queue key.
    in_flight: Mutex<()>,
}

impl RetryQueueFlusher {
    pub fn new(store: Arc<dyn KvStore>, delivery: Arc<dyn PayloadDelivery>) -> Self {
        Self {
            store,
            delivery,
            deadline: None,
            in_flight: Mutex::new(()),
        }
    }

    pub fn from_config(
        store: Arc<dyn KvStore>,
        delivery: Arc<dyn PayloadDelivery>,
        config: &AppConfig,
    ) -> Self {
        Self::new(store, delivery).with_deadline(config.cycle_deadline())
    }

    /// Stop starting new deliveries once `deadline` has elapsed; the rest stay queued.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run one flush cycle. Never fails: store errors end the cycle as [`FlushOutcome::Aborted`].
    pub async fn flush(&self) -> FlushOutcome {
        let _in_flight = self.in_flight.lock().await;

        match self.flush_locked().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Flush cycle aborted, queue left for next trigger");
                FlushOutcome::Aborted
            }
        }
    }

    async fn flush_locked(&self) -> Result<FlushOutcome, AppError> {
        let Some(token) = self.store.get(JWT_TOKEN_KEY).await? else {
            tracing::debug!("No bearer token stored, skipping flush");
            return Ok(FlushOutcome::NoToken);
        };

        let raw = self.store.get(RETRY_QUEUE_KEY).await?;
        let (queue, entries) = RetryQueue::parse_counted(raw.as_deref());
        // An array of only non-objects still gets rewritten, which drops the junk.
        if entries == 0 {
            return Ok(FlushOutcome::EmptyQueue);
        }

        let started = Instant::now();
        let attempted_total = queue.len();
        let mut survivors = RetryQueue::new();
        let mut delivered = 0usize;
        let mut deferred = 0usize;

        for (index, payload) in queue.into_payloads().into_iter().enumerate() {
            if self.deadline.is_some_and(|d| started.elapsed() >= d) {
                deferred += 1;
                survivors.push(payload);
                continue;
            }

            if self.deliver_isolated(&token, &payload, index).await {
                delivered += 1;
            } else {
                survivors.push(payload);
            }
        }

        self.store.set(RETRY_QUEUE_KEY, &survivors.to_json()?).await?;

        let attempted = attempted_total - deferred;
        let retained = survivors.len() - deferred;

        if deferred > 0 {
            tracing::warn!(deferred, "Cycle deadline reached, remaining payloads deferred");
        }
        tracing::info!(attempted, delivered, retained, deferred, "Retry queue flushed");

        Ok(FlushOutcome::Flushed {
            attempted,
            delivered,
            retained,
            deferred,
        })
    }

    /// Deliver one payload behind its own panic boundary. Returns whether it was accepted.
    async fn deliver_isolated(&self, token: &str, payload: &PendingPayload, index: usize) -> bool {
        let delivery = self.delivery.clone();
        let token = token.to_string();
        let sent = payload.clone();

        match run_isolated(async move { delivery.deliver(&token, &sent).await }).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(index, error = %e, "Payload delivery failed, keeping it queued");
                false
            }
            Err(e) => {
                tracing::error!(index, error = %e, "Payload delivery panicked, keeping it queued");
                false
            }
        }
    }
}
