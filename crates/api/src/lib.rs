//! Control API of the capture agent.
//!
//! Endpoints:
//! - GET  /health: liveness
//! - POST /api/jobs/run: request a one-shot health cycle
//! - GET  /api/jobs: live scheduled jobs
//! - GET  /api/jobs/{name}: one live job
//! - GET  /api/queue: retry-queue status

pub mod routes;
pub mod state;
