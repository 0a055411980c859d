use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Outcome a worker reports back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkResult {
    /// The run completed; partial failures inside the run are the worker's business.
    Success,
    /// Something unexpected happened; run again after the job's backoff delay.
    Retry,
}

impl std::fmt::Display for WorkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkResult::Success => write!(f, "success"),
            WorkResult::Retry => write!(f, "retry"),
        }
    }
}

/// Identity of a single invocation, handed to [`Worker::do_work`].
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_name: String,
    pub job_id: Uuid,
    /// 1 for the first attempt of a run, incremented on each retry.
    pub attempt: u32,
}

/// A unit of background work the scheduler can invoke.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn do_work(&self, ctx: &JobContext) -> WorkResult;
}
