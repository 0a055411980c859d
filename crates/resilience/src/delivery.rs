//! Delivery of a single payload to the collection endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use bipe_common::config::AppConfig;
use bipe_common::error::AppError;
use bipe_common::types::PendingPayload;

/// Sends one payload to the collector.
#[async_trait]
pub trait PayloadDelivery: Send + Sync {
    /// `Ok(())` only when the collector accepted the payload.
    async fn deliver(&self, token: &str, payload: &PendingPayload) -> Result<(), AppError>;
}

/// JSON-over-HTTP delivery with bearer authentication.
///
/// Acceptance is HTTP 200 exactly. Any other status, including other 2xx codes,
/// counts as a failure so the payload stays queued.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDelivery {
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.collector_url.clone(),
            Duration::from_secs(config.delivery_connect_timeout_secs),
            Duration::from_secs(config.delivery_read_timeout_secs),
        )
    }
}

#[async_trait]
impl PayloadDelivery for HttpDelivery {
    async fn deliver(&self, token: &str, payload: &PendingPayload) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AppError::Delivery(format!(
                "collector answered {}",
                status
            )));
        }

        Ok(())
    }
}
