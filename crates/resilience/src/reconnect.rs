//! Best-effort recovery of the capture service's live connection.
//!
//! Three independent actions run on every trigger. Each one has its own failure
//! boundary (errors and panics alike), so any of them may fail without stopping the
//! others or the queue flush that follows.

use std::sync::Arc;

use bipe_common::config::AppConfig;
use bipe_common::types::TriggerSource;
use bipe_scheduler::run_isolated;

use crate::capture::CaptureService;

/// Lowest platform API level that supports rebinding the listener.
pub const MIN_REBIND_API_LEVEL: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    Reconnect,
    Rebind,
    SignalReady,
}

impl std::fmt::Display for RecoveryStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryStep::Reconnect => write!(f, "reconnect"),
            RecoveryStep::Rebind => write!(f, "rebind"),
            RecoveryStep::SignalReady => write!(f, "signal_ready"),
        }
    }
}

pub struct ReconnectOrchestrator {
    capture: Arc<dyn CaptureService>,
    platform_api_level: u32,
}

impl ReconnectOrchestrator {
    pub fn new(capture: Arc<dyn CaptureService>, platform_api_level: u32) -> Self {
        Self {
            capture,
            platform_api_level,
        }
    }

    pub fn from_config(capture: Arc<dyn CaptureService>, config: &AppConfig) -> Self {
        Self::new(capture, config.platform_api_level)
    }

    /// Run every recovery step in order. Never fails.
    pub async fn recover(&self, trigger: TriggerSource) {
        self.run_step(RecoveryStep::Reconnect, trigger).await;

        if self.platform_api_level >= MIN_REBIND_API_LEVEL {
            self.run_step(RecoveryStep::Rebind, trigger).await;
        } else {
            tracing::debug!(
                api_level = self.platform_api_level,
                "Platform too old for listener rebind, skipping"
            );
        }

        self.run_step(RecoveryStep::SignalReady, trigger).await;
    }

    async fn run_step(&self, step: RecoveryStep, trigger: TriggerSource) {
        let capture = self.capture.clone();
        let outcome = run_isolated(async move {
            match step {
                RecoveryStep::Reconnect => capture.reconnect().await,
                RecoveryStep::Rebind => capture.request_rebind().await,
                RecoveryStep::SignalReady => capture.signal_ready().await,
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => tracing::debug!(%step, %trigger, "Recovery step sent"),
            Ok(Err(e)) => tracing::warn!(%step, %trigger, error = %e, "Recovery step failed"),
            Err(e) => tracing::error!(%step, %trigger, error = %e, "Recovery step panicked"),
        }
    }
}
