//! Control surface of the external notification-capture service.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use bipe_common::config::AppConfig;
use bipe_common::error::AppError;

/// The three recovery primitives the capture service exposes.
///
/// Each call is a request, not a guarantee: the platform offers no reliable way to
/// observe whether the listener is actually bound afterwards.
#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Ask the service's lifecycle manager to reconnect if it considers itself disconnected.
    async fn reconnect(&self) -> Result<(), AppError>;

    /// Ask the host platform to rebind the listener component.
    async fn request_rebind(&self) -> Result<(), AppError>;

    /// Send the `RECEIVER_READY` command so the service runs its own readiness checks.
    async fn signal_ready(&self) -> Result<(), AppError>;
}

/// Capture service driven through shell commands, one per verb.
///
/// An unconfigured verb is a no-op. A command that cannot be spawned, exits
/// non-zero, or outlives `timeout` is reported as an error.
#[derive(Debug, Clone)]
pub struct ProcessCaptureService {
    reconnect_cmd: Option<String>,
    rebind_cmd: Option<String>,
    ready_cmd: Option<String>,
    timeout: Duration,
}

impl ProcessCaptureService {
    pub fn new(
        reconnect_cmd: Option<String>,
        rebind_cmd: Option<String>,
        ready_cmd: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            reconnect_cmd,
            rebind_cmd,
            ready_cmd,
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.capture_reconnect_cmd.clone(),
            config.capture_rebind_cmd.clone(),
            config.capture_ready_cmd.clone(),
            Duration::from_secs(config.capture_command_timeout_secs),
        )
    }

    async fn run(&self, verb: &str, command: Option<&str>) -> Result<(), AppError> {
        let Some(command) = command else {
            tracing::debug!(verb, "No capture command configured, skipping");
            return Ok(());
        };

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Capture(format!("{} command failed to start: {}", verb, e)))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| {
                AppError::Capture(format!(
                    "{} command timed out after {}s",
                    verb,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::Capture(format!("{} command failed: {}", verb, e)))?;

        if !status.success() {
            return Err(AppError::Capture(format!(
                "{} command exited with {}",
                verb, status
            )));
        }

        tracing::debug!(verb, "Capture command completed");
        Ok(())
    }
}

#[async_trait]
impl CaptureService for ProcessCaptureService {
    async fn reconnect(&self) -> Result<(), AppError> {
        self.run("reconnect", self.reconnect_cmd.as_deref()).await
    }

    async fn request_rebind(&self) -> Result<(), AppError> {
        self.run("rebind", self.rebind_cmd.as_deref()).await
    }

    async fn signal_ready(&self) -> Result<(), AppError> {
        self.run("ready", self.ready_cmd.as_deref()).await
    }
}
