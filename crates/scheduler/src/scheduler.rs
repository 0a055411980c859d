//! Named unique-job scheduler.
//!
//! Mirrors the two contracts the health routine relies on:
//! - "run once, now" under a unique name ([`JobScheduler::enqueue_unique_work`])
//! - "run every N, forever" under a unique name ([`JobScheduler::enqueue_unique_periodic_work`])
//!
//! [`ExistingWorkPolicy`] decides what happens when a live job already owns the name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::backoff::BackoffPolicy;
use crate::constraints::{AlwaysConnected, ConnectivityProbe, Constraints};
use crate::task::run_isolated;
use crate::worker::{JobContext, WorkResult, Worker};

/// Default interval between constraint re-checks while a run is deferred.
const DEFAULT_CONSTRAINT_POLL: Duration = Duration::from_secs(30);

/// What to do when a live job already owns the requested name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    /// Cancel the live job and start the new request in its place.
    Replace,
    /// Keep the live job untouched and drop the new request.
    Keep,
}

/// Result of an enqueue call, carrying the id of the job that now owns the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(Uuid),
    Replaced(Uuid),
    Kept(Uuid),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueOutcome::Enqueued(id)
            | EnqueueOutcome::Replaced(id)
            | EnqueueOutcome::Kept(id) => *id,
        }
    }
}

/// A request to run a worker once.
#[derive(Clone)]
pub struct OneTimeWorkRequest {
    worker: Arc<dyn Worker>,
    constraints: Constraints,
    backoff: BackoffPolicy,
}

impl OneTimeWorkRequest {
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self {
            worker,
            constraints: Constraints::default(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// A request to run a worker every `period`, starting immediately.
#[derive(Clone)]
pub struct PeriodicWorkRequest {
    worker: Arc<dyn Worker>,
    period: Duration,
    constraints: Constraints,
    backoff: BackoffPolicy,
}

impl PeriodicWorkRequest {
    pub fn new(worker: Arc<dyn Worker>, period: Duration) -> Self {
        Self {
            worker,
            period,
            constraints: Constraints::default(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    OneTime,
    Periodic { period_secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Deferred until its constraints are met.
    Blocked,
    Running,
    /// Waiting out a backoff delay after a `Retry`.
    BackingOff,
    /// Periodic job waiting for its next tick.
    Idle,
}

/// Snapshot of a live job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_result: Option<WorkResult>,
    pub run_count: u64,
}

type SharedInfo = Arc<Mutex<JobInfo>>;

struct JobEntry {
    info: SharedInfo,
    task: JoinHandle<()>,
}

type JobMap = Arc<tokio::sync::Mutex<HashMap<String, JobEntry>>>;

struct Runner {
    jobs: JobMap,
    probe: Arc<dyn ConnectivityProbe>,
    constraint_poll: Duration,
    info: SharedInfo,
}

/// Scheduler owning every named job. Cloning yields another handle to the same jobs.
#[derive(Clone)]
pub struct JobScheduler {
    jobs: JobMap,
    probe: Arc<dyn ConnectivityProbe>,
    constraint_poll: Duration,
}

impl JobScheduler {
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            jobs: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            probe,
            constraint_poll: DEFAULT_CONSTRAINT_POLL,
        }
    }

    /// Override how often a deferred run re-checks its constraints.
    pub fn with_constraint_poll(mut self, interval: Duration) -> Self {
        self.constraint_poll = interval;
        self
    }

    /// Enqueue a one-time job under `name`.
    pub async fn enqueue_unique_work(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        request: OneTimeWorkRequest,
    ) -> EnqueueOutcome {
        self.enqueue(name, policy, JobKind::OneTime, move |runner, ctx_name, id| {
            tokio::spawn(runner.run_one_time(ctx_name, id, request))
        })
        .await
    }

    /// Enqueue a periodic job under `name`.
    pub async fn enqueue_unique_periodic_work(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        request: PeriodicWorkRequest,
    ) -> EnqueueOutcome {
        let kind = JobKind::Periodic {
            period_secs: request.period.as_secs(),
        };
        self.enqueue(name, policy, kind, move |runner, ctx_name, id| {
            tokio::spawn(runner.run_periodic(ctx_name, id, request))
        })
        .await
    }

    async fn enqueue<F>(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        kind: JobKind,
        spawn: F,
    ) -> EnqueueOutcome
    where
        F: FnOnce(Runner, String, Uuid) -> JoinHandle<()>,
    {
        let mut jobs = self.jobs.lock().await;

        let live_id = jobs.get(name).map(|entry| lock_info(&entry.info).id);
        let replaced = match live_id {
            Some(live_id) if policy == ExistingWorkPolicy::Keep => {
                tracing::debug!(job = %name, job_id = %live_id, "Job already live, keeping existing");
                return EnqueueOutcome::Kept(live_id);
            }
            Some(live_id) => {
                if let Some(old) = jobs.remove(name) {
                    old.task.abort();
                }
                tracing::info!(job = %name, job_id = %live_id, "Cancelled live job for replacement");
                true
            }
            None => false,
        };

        let id = Uuid::new_v4();
        let info = Arc::new(Mutex::new(JobInfo {
            name: name.to_string(),
            id,
            kind,
            state: JobState::Blocked,
            enqueued_at: Utc::now(),
            last_run_at: None,
            last_result: None,
            run_count: 0,
        }));

        let runner = Runner {
            jobs: self.jobs.clone(),
            probe: self.probe.clone(),
            constraint_poll: self.constraint_poll,
            info: info.clone(),
        };
        let task = spawn(runner, name.to_string(), id);
        jobs.insert(name.to_string(), JobEntry { info, task });

        tracing::info!(job = %name, job_id = %id, ?kind, replaced, "Job enqueued");

        if replaced {
            EnqueueOutcome::Replaced(id)
        } else {
            EnqueueOutcome::Enqueued(id)
        }
    }

    /// Cancel the live job owning `name`. Returns `false` when there was none.
    pub async fn cancel_unique_work(&self, name: &str) -> bool {
        match self.jobs.lock().await.remove(name) {
            Some(entry) => {
                entry.task.abort();
                tracing::info!(job = %name, "Job cancelled");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the live job owning `name`.
    pub async fn job_info(&self, name: &str) -> Option<JobInfo> {
        self.jobs
            .lock()
            .await
            .get(name)
            .map(|entry| lock_info(&entry.info).clone())
    }

    /// Snapshots of every live job, sorted by name.
    pub async fn jobs(&self) -> Vec<JobInfo> {
        let mut infos: Vec<JobInfo> = self
            .jobs
            .lock()
            .await
            .values()
            .map(|entry| lock_info(&entry.info).clone())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Cancel every live job.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (name, entry) in jobs.drain() {
            entry.task.abort();
            tracing::debug!(job = %name, "Job stopped on shutdown");
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysConnected))
    }
}

impl Runner {
    async fn run_one_time(self, name: String, id: Uuid, request: OneTimeWorkRequest) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.await_constraints(&name, request.constraints).await;

            match self.invoke(&request.worker, &name, id, attempt).await {
                WorkResult::Success => break,
                WorkResult::Retry => {
                    let delay = request.backoff.delay_for(attempt);
                    tracing::warn!(
                        job = %name,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "Job asked for retry, backing off"
                    );
                    self.set_state(JobState::BackingOff);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Leave the registry, unless a replacement already took the name.
        let mut jobs = self.jobs.lock().await;
        if jobs
            .get(&name)
            .is_some_and(|entry| lock_info(&entry.info).id == id)
        {
            jobs.remove(&name);
        }
        tracing::debug!(job = %name, job_id = %id, "One-time job finished");
    }

    async fn run_periodic(self, name: String, id: Uuid, request: PeriodicWorkRequest) {
        let mut ticker = tokio::time::interval(request.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let mut attempt = 0u32;
            loop {
                attempt += 1;
                self.await_constraints(&name, request.constraints).await;

                if self.invoke(&request.worker, &name, id, attempt).await == WorkResult::Success {
                    break;
                }

                let delay = request.backoff.delay_for(attempt);
                if delay >= request.period {
                    tracing::warn!(
                        job = %name,
                        attempt,
                        "Periodic job still asking for retry, deferring to next period"
                    );
                    break;
                }
                tracing::warn!(
                    job = %name,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Periodic job asked for retry, backing off"
                );
                self.set_state(JobState::BackingOff);
                tokio::time::sleep(delay).await;
            }

            self.set_state(JobState::Idle);
        }
    }

    async fn await_constraints(&self, name: &str, constraints: Constraints) {
        if !constraints.requires_network {
            return;
        }

        let mut logged = false;
        while !self.probe.is_connected().await {
            if !logged {
                tracing::info!(job = %name, "Network unavailable, deferring job run");
                logged = true;
            }
            self.set_state(JobState::Blocked);
            tokio::time::sleep(self.constraint_poll).await;
        }
    }

    /// Run the worker on its own task so a panic surfaces as `Retry` instead of
    /// killing the job loop.
    async fn invoke(
        &self,
        worker: &Arc<dyn Worker>,
        name: &str,
        id: Uuid,
        attempt: u32,
    ) -> WorkResult {
        self.set_state(JobState::Running);
        {
            let mut info = lock_info(&self.info);
            info.last_run_at = Some(Utc::now());
            info.run_count += 1;
        }

        let ctx = JobContext {
            job_name: name.to_string(),
            job_id: id,
            attempt,
        };
        let worker = worker.clone();
        let result = match run_isolated(async move { worker.do_work(&ctx).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(job = %name, error = %e, "Worker terminated unexpectedly");
                WorkResult::Retry
            }
        };

        lock_info(&self.info).last_result = Some(result);
        tracing::debug!(job = %name, attempt, %result, "Job run finished");
        result
    }

    fn set_state(&self, state: JobState) {
        lock_info(&self.info).state = state;
    }
}

fn lock_info(info: &Mutex<JobInfo>) -> std::sync::MutexGuard<'_, JobInfo> {
    info.lock().unwrap_or_else(PoisonError::into_inner)
}
