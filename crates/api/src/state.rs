//! Shared application state for the Axum API server.

use std::sync::Arc;

use bipe_common::store::KvStore;
use bipe_resilience::triggers::HealthTriggers;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub triggers: HealthTriggers,
    pub store: Arc<dyn KvStore>,
}

impl AppState {
    pub fn new(triggers: HealthTriggers, store: Arc<dyn KvStore>) -> Self {
        Self { triggers, store }
    }
}
