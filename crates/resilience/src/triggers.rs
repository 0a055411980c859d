//! Wiring between trigger sources and the job scheduler.
//!
//! - boot: recovery steps right away, then a REPLACE one-time run and a KEEP periodic job
//! - manual: a REPLACE one-time run under its own name

use std::sync::Arc;
use std::time::Duration;

use bipe_common::types::TriggerSource;
use bipe_scheduler::{
    Constraints, EnqueueOutcome, ExistingWorkPolicy, JobScheduler, OneTimeWorkRequest,
    PeriodicWorkRequest,
};

use crate::flusher::RetryQueueFlusher;
use crate::reconnect::ReconnectOrchestrator;
use crate::worker::HealthWorker;

pub const BOOT_JOB_NAME: &str = "bipe_health_boot";
pub const PERIODIC_JOB_NAME: &str = "bipe_health_periodic";
pub const MANUAL_JOB_NAME: &str = "bipe_health_manual";

/// Default cadence of the periodic health job.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Jobs enqueued by [`HealthTriggers::on_boot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSchedule {
    pub boot: EnqueueOutcome,
    pub periodic: EnqueueOutcome,
}

#[derive(Clone)]
pub struct HealthTriggers {
    orchestrator: Arc<ReconnectOrchestrator>,
    flusher: Arc<RetryQueueFlusher>,
    scheduler: JobScheduler,
    interval: Duration,
}

impl HealthTriggers {
    pub fn new(
        orchestrator: Arc<ReconnectOrchestrator>,
        flusher: Arc<RetryQueueFlusher>,
        scheduler: JobScheduler,
    ) -> Self {
        Self {
            orchestrator,
            flusher,
            scheduler,
            interval: DEFAULT_HEALTH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    fn worker(&self, trigger: TriggerSource) -> Arc<HealthWorker> {
        Arc::new(HealthWorker::new(
            self.orchestrator.clone(),
            self.flusher.clone(),
            trigger,
        ))
    }

    /// Handle a device boot.
    pub async fn on_boot(&self) -> BootSchedule {
        tracing::info!("Device booted, running recovery and scheduling health jobs");

        self.orchestrator.recover(TriggerSource::Boot).await;

        let boot = self
            .scheduler
            .enqueue_unique_work(
                BOOT_JOB_NAME,
                ExistingWorkPolicy::Replace,
                OneTimeWorkRequest::new(self.worker(TriggerSource::Boot))
                    .with_constraints(Constraints::network_connected()),
            )
            .await;

        let periodic = self
            .scheduler
            .enqueue_unique_periodic_work(
                PERIODIC_JOB_NAME,
                ExistingWorkPolicy::Keep,
                PeriodicWorkRequest::new(self.worker(TriggerSource::Periodic), self.interval)
                    .with_constraints(Constraints::network_connected()),
            )
            .await;

        tracing::info!(
            boot_job = %boot.job_id(),
            periodic_job = %periodic.job_id(),
            interval_secs = self.interval.as_secs(),
            "Health jobs scheduled"
        );

        BootSchedule { boot, periodic }
    }

    /// Request an immediate one-shot health cycle.
    pub async fn request_manual_run(&self) -> EnqueueOutcome {
        let outcome = self
            .scheduler
            .enqueue_unique_work(
                MANUAL_JOB_NAME,
                ExistingWorkPolicy::Replace,
                OneTimeWorkRequest::new(self.worker(TriggerSource::Manual)),
            )
            .await;

        tracing::info!(job_id = %outcome.job_id(), "Manual health cycle requested");
        outcome
    }
}
