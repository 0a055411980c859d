use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Store key holding the bearer token used for delivery.
pub const JWT_TOKEN_KEY: &str = "jwt_token";

/// Store key holding the JSON array of undelivered payloads.
pub const RETRY_QUEUE_KEY: &str = "native_retry_queue";

/// Where a health cycle was triggered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Boot,
    Periodic,
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Boot => write!(f, "boot"),
            TriggerSource::Periodic => write!(f, "periodic"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}

/// One undelivered alert event.
///
/// The object is opaque: no field is interpreted, and it is posted verbatim.
/// Equality is structural, so two identical events compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingPayload(Map<String, Value>);

impl PendingPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a payload from any JSON value, returning `None` for non-objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Ordered list of payloads persisted under [`RETRY_QUEUE_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryQueue(Vec<PendingPayload>);

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the stored representation leniently.
    ///
    /// A missing value, unparsable JSON, or a non-array document all yield an empty
    /// queue. Array entries that are not objects are skipped.
    pub fn parse(raw: Option<&str>) -> Self {
        Self::parse_counted(raw).0
    }

    /// Like [`RetryQueue::parse`], also returning how many entries the stored array
    /// held before non-objects were skipped.
    ///
    /// A non-zero count with an empty queue means the stored array holds only junk
    /// and should still be rewritten.
    pub fn parse_counted(raw: Option<&str>) -> (Self, usize) {
        let Some(raw) = raw else {
            return (Self::default(), 0);
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => {
                let total = items.len();
                let payloads: Vec<PendingPayload> =
                    items.into_iter().filter_map(PendingPayload::from_value).collect();
                if payloads.len() < total {
                    tracing::warn!(
                        skipped = total - payloads.len(),
                        "Skipping non-object entries in retry queue"
                    );
                }
                (Self(payloads), total)
            }
            Ok(_) => {
                tracing::warn!("Retry queue is not a JSON array, treating as empty");
                (Self::default(), 0)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retry queue is malformed, treating as empty");
                (Self::default(), 0)
            }
        }
    }

    pub fn push(&mut self, payload: PendingPayload) {
        self.0.push(payload);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn payloads(&self) -> &[PendingPayload] {
        &self.0
    }

    pub fn into_payloads(self) -> Vec<PendingPayload> {
        self.0
    }

    /// Serialize to the JSON array stored under [`RETRY_QUEUE_KEY`].
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl FromIterator<PendingPayload> for RetryQueue {
    fn from_iter<I: IntoIterator<Item = PendingPayload>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
