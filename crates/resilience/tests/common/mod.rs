//! Test doubles shared by the resilience integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use bipe_common::error::AppError;
use bipe_common::store::{KvStore, MemoryStore};
use bipe_common::types::{JWT_TOKEN_KEY, PendingPayload, RETRY_QUEUE_KEY, RetryQueue};
use bipe_resilience::capture::CaptureService;
use bipe_resilience::delivery::PayloadDelivery;

pub const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.device.sig";

pub fn payload(id: &str) -> PendingPayload {
    PendingPayload::from_value(json!({
        "id": id,
        "title": "Yape",
        "text": format!("Recibiste S/ 10.00 ({})", id),
    }))
    .unwrap()
}

pub fn queue_json(ids: &[&str]) -> String {
    ids.iter()
        .map(|id| payload(id))
        .collect::<RetryQueue>()
        .to_json()
        .unwrap()
}

pub fn ids_of(raw: &str) -> Vec<String> {
    RetryQueue::parse(Some(raw))
        .payloads()
        .iter()
        .map(|p| p.as_map()["id"].as_str().unwrap().to_string())
        .collect()
}

pub fn store_with(token: Option<&str>, queue: Option<&str>) -> MemoryStore {
    let mut entries = Vec::new();
    if let Some(token) = token {
        entries.push((JWT_TOKEN_KEY, token.to_string()));
    }
    if let Some(queue) = queue {
        entries.push((RETRY_QUEUE_KEY, queue.to_string()));
    }
    MemoryStore::with_entries(entries)
}

// ============================================================
// Store doubles
// ============================================================

/// Wraps a store and records every key read and written.
pub struct RecordingStore {
    inner: MemoryStore,
    pub reads: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<String>>,
    pub fail_reads_of: Mutex<HashSet<String>>,
    pub fail_writes: AtomicBool,
    pub panic_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            fail_reads_of: Mutex::new(HashSet::new()),
            fail_writes: AtomicBool::new(false),
            panic_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads_of(self, key: &str) -> Self {
        self.fail_reads_of.lock().unwrap().insert(key.to_string());
        self
    }

    pub fn fail_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn panic_on_write(self) -> Self {
        self.panic_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub async fn value(&self, key: &str) -> Option<String> {
        self.inner.get(key).await.unwrap()
    }
}

#[async_trait]
impl KvStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.reads.lock().unwrap().push(key.to_string());
        if self.fail_reads_of.lock().unwrap().contains(key) {
            return Err(AppError::Store(format!("read of {} failed", key)));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.writes.lock().unwrap().push(key.to_string());
        if self.panic_writes.load(Ordering::SeqCst) {
            panic!("store crashed writing {}", key);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Store(format!("write of {} failed", key)));
        }
        self.inner.set(key, value).await
    }
}

// ============================================================
// Delivery double
// ============================================================

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ok,
    Status(u16),
    Timeout,
    Panic,
}

/// Delivery that answers per payload id (default: accepted) and records every call.
pub struct ScriptedDelivery {
    replies: HashMap<String, Reply>,
    latency: Duration,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedDelivery {
    pub fn accepting() -> Self {
        Self {
            replies: HashMap::new(),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, id: &str, reply: Reply) -> Self {
        self.replies.insert(id.to_string(), reply);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn called_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body["id"].as_str().unwrap().to_string())
            .collect()
    }
}

#[async_trait]
impl PayloadDelivery for ScriptedDelivery {
    async fn deliver(&self, token: &str, payload: &PendingPayload) -> Result<(), AppError> {
        let body = serde_json::to_value(payload).unwrap();
        let id = body["id"].as_str().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push((token.to_string(), body));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.replies.get(&id).copied().unwrap_or(Reply::Ok) {
            Reply::Ok => Ok(()),
            Reply::Status(code) => Err(AppError::Delivery(format!("collector answered {}", code))),
            Reply::Timeout => Err(AppError::Delivery("operation timed out".to_string())),
            Reply::Panic => panic!("delivery exploded for {}", id),
        }
    }
}

// ============================================================
// Capture-service double
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Error,
    Panic,
}

/// Capture service that records calls and can fail any verb.
pub struct FakeCapture {
    pub reconnect_fault: Fault,
    pub rebind_fault: Fault,
    pub ready_fault: Fault,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeCapture {
    pub fn healthy() -> Self {
        Self {
            reconnect_fault: Fault::None,
            rebind_fault: Fault::None,
            ready_fault: Fault::None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, verb: &'static str, fault: Fault) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(verb);
        match fault {
            Fault::None => Ok(()),
            Fault::Error => Err(AppError::Capture(format!("{} unavailable", verb))),
            Fault::Panic => panic!("{} crashed", verb),
        }
    }
}

#[async_trait]
impl CaptureService for FakeCapture {
    async fn reconnect(&self) -> Result<(), AppError> {
        self.record("reconnect", self.reconnect_fault)
    }

    async fn request_rebind(&self) -> Result<(), AppError> {
        self.record("rebind", self.rebind_fault)
    }

    async fn signal_ready(&self) -> Result<(), AppError> {
        self.record("ready", self.ready_fault)
    }
}
