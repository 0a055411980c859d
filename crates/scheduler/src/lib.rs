//! In-process unique-job scheduler.
//!
//! Jobs are identified by name. A name owns at most one live job, and the runs of
//! that job happen one after another on a dedicated task, so two invocations of the
//! same job never overlap.

pub mod backoff;
pub mod constraints;
pub mod scheduler;
pub mod task;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use constraints::{AlwaysConnected, ConnectivityProbe, Constraints, TcpProbe};
pub use scheduler::{
    EnqueueOutcome, ExistingWorkPolicy, JobInfo, JobKind, JobScheduler, JobState,
    OneTimeWorkRequest, PeriodicWorkRequest,
};
pub use task::run_isolated;
pub use worker::{JobContext, WorkResult, Worker};
