use std::sync::Arc;

use async_trait::async_trait;

use bipe_common::types::TriggerSource;
use bipe_scheduler::{JobContext, WorkResult, Worker, run_isolated};

use crate::flusher::{FlushOutcome, RetryQueueFlusher};
use crate::reconnect::ReconnectOrchestrator;

/// One health cycle: recovery steps, then a queue flush.
///
/// Reports `Success` whenever the cycle completes, even if individual payloads
/// stayed queued. Only a panic escaping the cycle turns into `Retry`. Cancelling the
/// job mid-cycle stops the cycle too; an unwritten queue is left as it was.
#[derive(Clone)]
pub struct HealthWorker {
    orchestrator: Arc<ReconnectOrchestrator>,
    flusher: Arc<RetryQueueFlusher>,
    trigger: TriggerSource,
}

impl HealthWorker {
    pub fn new(
        orchestrator: Arc<ReconnectOrchestrator>,
        flusher: Arc<RetryQueueFlusher>,
        trigger: TriggerSource,
    ) -> Self {
        Self {
            orchestrator,
            flusher,
            trigger,
        }
    }

    pub fn trigger(&self) -> TriggerSource {
        self.trigger
    }

    pub async fn run_cycle(&self) -> FlushOutcome {
        self.orchestrator.recover(self.trigger).await;
        self.flusher.flush().await
    }
}

#[async_trait]
impl Worker for HealthWorker {
    async fn do_work(&self, ctx: &JobContext) -> WorkResult {
        let worker = self.clone();
        match run_isolated(async move { worker.run_cycle().await }).await {
            Ok(outcome) => {
                tracing::info!(
                    job = %ctx.job_name,
                    trigger = %self.trigger,
                    attempt = ctx.attempt,
                    ?outcome,
                    "Health cycle completed"
                );
                WorkResult::Success
            }
            Err(e) => {
                tracing::error!(
                    job = %ctx.job_name,
                    trigger = %self.trigger,
                    error = %e,
                    "Health cycle failed unexpectedly"
                );
                WorkResult::Retry
            }
        }
    }
}
