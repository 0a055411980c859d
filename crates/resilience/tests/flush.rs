//! Flush-cycle behaviour against in-memory doubles.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bipe_common::types::{JWT_TOKEN_KEY, RETRY_QUEUE_KEY};
use bipe_resilience::flusher::{FlushOutcome, RetryQueueFlusher};

use common::{RecordingStore, Reply, ScriptedDelivery, TOKEN, ids_of, queue_json, store_with};

fn flusher(store: &Arc<RecordingStore>, delivery: &Arc<ScriptedDelivery>) -> RetryQueueFlusher {
    RetryQueueFlusher::new(store.clone(), delivery.clone())
}

// ============================================================
// Short-circuits
// ============================================================

#[tokio::test]
async fn test_no_token_skips_everything() {
    let queue = queue_json(&["a", "b"]);
    let store = Arc::new(RecordingStore::new(store_with(None, Some(&queue))));
    let delivery = Arc::new(ScriptedDelivery::accepting());

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(outcome, FlushOutcome::NoToken);
    assert_eq!(delivery.call_count(), 0);
    assert_eq!(store.reads(), vec![JWT_TOKEN_KEY.to_string()]);
    assert!(store.writes().is_empty());
    assert_eq!(store.value(RETRY_QUEUE_KEY).await, Some(queue));
}

#[tokio::test]
async fn test_absent_queue_is_noop() {
    let store = Arc::new(RecordingStore::new(store_with(Some(TOKEN), None)));
    let delivery = Arc::new(ScriptedDelivery::accepting());

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(outcome, FlushOutcome::EmptyQueue);
    assert_eq!(delivery.call_count(), 0);
    assert!(store.writes().is_empty());
    assert_eq!(store.value(RETRY_QUEUE_KEY).await, None);
}

#[tokio::test]
async fn test_empty_queue_is_noop() {
    let store = Arc::new(RecordingStore::new(store_with(Some(TOKEN), Some("[]"))));
    let delivery = Arc::new(ScriptedDelivery::accepting());

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(outcome, FlushOutcome::EmptyQueue);
    assert_eq!(delivery.call_count(), 0);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_malformed_queue_treated_as_empty() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some("{not valid json"),
    )));
    let delivery = Arc::new(ScriptedDelivery::accepting());

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(outcome, FlushOutcome::EmptyQueue);
    assert_eq!(delivery.call_count(), 0);
    assert!(store.writes().is_empty());
    assert_eq!(
        store.value(RETRY_QUEUE_KEY).await.as_deref(),
        Some("{not valid json")
    );
}

#[tokio::test]
async fn test_empty_token_is_still_used() {
    let queue = queue_json(&["a"]);
    let store = Arc::new(RecordingStore::new(store_with(Some(""), Some(&queue))));
    let delivery = Arc::new(ScriptedDelivery::accepting());

    flusher(&store, &delivery).flush().await;

    assert_eq!(delivery.calls.lock().unwrap()[0].0, "");
}

// ============================================================
// Partial success bookkeeping
// ============================================================

#[tokio::test]
async fn test_all_success_clears_queue() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(&queue_json(&["a", "b", "c"])),
    )));
    let delivery = Arc::new(ScriptedDelivery::accepting());

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(
        outcome,
        FlushOutcome::Flushed {
            attempted: 3,
            delivered: 3,
            retained: 0,
            deferred: 0
        }
    );
    assert_eq!(store.value(RETRY_QUEUE_KEY).await.as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_mixed_outcome_keeps_only_failures() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(&queue_json(&["a", "b", "c"])),
    )));
    let delivery = Arc::new(ScriptedDelivery::accepting().reply("b", Reply::Timeout));

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(
        outcome,
        FlushOutcome::Flushed {
            attempted: 3,
            delivered: 2,
            retained: 1,
            deferred: 0
        }
    );
    assert_eq!(delivery.called_ids(), vec!["a", "b", "c"]);

    let stored = store.value(RETRY_QUEUE_KEY).await.unwrap();
    assert_eq!(stored, queue_json(&["b"]));
}

#[tokio::test]
async fn test_non_object_only_queue_is_rewritten_empty() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(r#"[1, "x", null]"#),
    )));
    let delivery = Arc::new(ScriptedDelivery::accepting());

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(
        outcome,
        FlushOutcome::Flushed {
            attempted: 0,
            delivered: 0,
            retained: 0,
            deferred: 0
        }
    );
    assert_eq!(delivery.call_count(), 0);
    assert_eq!(store.writes(), vec![RETRY_QUEUE_KEY.to_string()]);
    assert_eq!(store.value(RETRY_QUEUE_KEY).await.as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_non_object_entries_dropped_from_rewrite() {
    let raw = format!(
        r#"[42, {}, "x"]"#,
        serde_json::to_string(&common::payload("a")).unwrap()
    );
    let store = Arc::new(RecordingStore::new(store_with(Some(TOKEN), Some(&raw))));
    let delivery = Arc::new(ScriptedDelivery::accepting().reply("a", Reply::Status(500)));

    flusher(&store, &delivery).flush().await;

    assert_eq!(delivery.called_ids(), vec!["a"]);
    assert_eq!(store.value(RETRY_QUEUE_KEY).await, Some(queue_json(&["a"])));
}

#[tokio::test]
async fn test_delivery_panic_is_isolated_to_its_payload() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(&queue_json(&["a", "b", "c"])),
    )));
    let delivery = Arc::new(ScriptedDelivery::accepting().reply("b", Reply::Panic));

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(
        outcome,
        FlushOutcome::Flushed {
            attempted: 3,
            delivered: 2,
            retained: 1,
            deferred: 0
        }
    );
    assert_eq!(delivery.called_ids(), vec!["a", "b", "c"]);
    assert_eq!(store.value(RETRY_QUEUE_KEY).await, Some(queue_json(&["b"])));
}

#[tokio::test]
async fn test_every_failure_kind_is_retained_once() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(&queue_json(&["ok1", "created", "server", "timeout", "ok2"])),
    )));
    let delivery = Arc::new(
        ScriptedDelivery::accepting()
            .reply("created", Reply::Status(201))
            .reply("server", Reply::Status(500))
            .reply("timeout", Reply::Timeout),
    );

    flusher(&store, &delivery).flush().await;

    let stored = store.value(RETRY_QUEUE_KEY).await.unwrap();
    assert_eq!(ids_of(&stored), vec!["created", "server", "timeout"]);
}

#[tokio::test]
async fn test_identical_payloads_each_attempted() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(&queue_json(&["dup", "dup"])),
    )));
    let delivery = Arc::new(ScriptedDelivery::accepting().reply("dup", Reply::Status(503)));

    flusher(&store, &delivery).flush().await;

    assert_eq!(delivery.call_count(), 2);
    let stored = store.value(RETRY_QUEUE_KEY).await.unwrap();
    assert_eq!(ids_of(&stored), vec!["dup", "dup"]);
}

#[tokio::test]
async fn test_all_failures_rewrite_identical_queue() {
    let queue = queue_json(&["a", "b"]);
    let store = Arc::new(RecordingStore::new(store_with(Some(TOKEN), Some(&queue))));
    let delivery = Arc::new(
        ScriptedDelivery::accepting()
            .reply("a", Reply::Status(500))
            .reply("b", Reply::Status(500)),
    );

    flusher(&store, &delivery).flush().await;

    assert_eq!(store.writes(), vec![RETRY_QUEUE_KEY.to_string()]);
    assert_eq!(store.value(RETRY_QUEUE_KEY).await, Some(queue));
}

#[tokio::test]
async fn test_token_forwarded_to_delivery() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(&queue_json(&["a"])),
    )));
    let delivery = Arc::new(ScriptedDelivery::accepting());

    flusher(&store, &delivery).flush().await;

    assert_eq!(delivery.calls.lock().unwrap()[0].0, TOKEN);
}

// ============================================================
// Store failures
// ============================================================

#[tokio::test]
async fn test_queue_read_failure_aborts_without_delivery() {
    let store = Arc::new(
        RecordingStore::new(store_with(Some(TOKEN), Some(&queue_json(&["a"]))))
            .fail_reads_of(RETRY_QUEUE_KEY),
    );
    let delivery = Arc::new(ScriptedDelivery::accepting());

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(outcome, FlushOutcome::Aborted);
    assert_eq!(delivery.call_count(), 0);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_token_read_failure_aborts() {
    let store = Arc::new(
        RecordingStore::new(store_with(Some(TOKEN), Some(&queue_json(&["a"]))))
            .fail_reads_of(JWT_TOKEN_KEY),
    );
    let delivery = Arc::new(ScriptedDelivery::accepting());

    assert_eq!(flusher(&store, &delivery).flush().await, FlushOutcome::Aborted);
    assert_eq!(delivery.call_count(), 0);
}

#[tokio::test]
async fn test_write_failure_leaves_queue_untouched() {
    let queue = queue_json(&["a", "b"]);
    let store = Arc::new(
        RecordingStore::new(store_with(Some(TOKEN), Some(&queue))).fail_writes(),
    );
    let delivery = Arc::new(ScriptedDelivery::accepting());

    let outcome = flusher(&store, &delivery).flush().await;

    assert_eq!(outcome, FlushOutcome::Aborted);
    assert_eq!(delivery.call_count(), 2);
    // Delivered payloads stay queued and will be sent again: at-least-once.
    assert_eq!(store.value(RETRY_QUEUE_KEY).await, Some(queue));
}

// ============================================================
// Deadline and single-flight
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_defers_remaining_payloads() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(&queue_json(&["a", "b", "c", "d"])),
    )));
    let delivery = Arc::new(
        ScriptedDelivery::accepting()
            .reply("a", Reply::Status(500))
            .with_latency(Duration::from_secs(10)),
    );

    let outcome = RetryQueueFlusher::new(store.clone(), delivery.clone())
        .with_deadline(Some(Duration::from_secs(15)))
        .flush()
        .await;

    assert_eq!(
        outcome,
        FlushOutcome::Flushed {
            attempted: 2,
            delivered: 1,
            retained: 1,
            deferred: 2
        }
    );
    assert_eq!(delivery.called_ids(), vec!["a", "b"]);

    let stored = store.value(RETRY_QUEUE_KEY).await.unwrap();
    assert_eq!(ids_of(&stored), vec!["a", "c", "d"]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_flushes_do_not_double_send() {
    let store = Arc::new(RecordingStore::new(store_with(
        Some(TOKEN),
        Some(&queue_json(&["a", "b", "c"])),
    )));
    let delivery = Arc::new(ScriptedDelivery::accepting().with_latency(Duration::from_secs(1)));
    let flusher = Arc::new(RetryQueueFlusher::new(store.clone(), delivery.clone()));

    let (first, second) = tokio::join!(flusher.flush(), flusher.flush());

    let outcomes = [first, second];
    assert!(outcomes.contains(&FlushOutcome::EmptyQueue));
    assert_eq!(delivery.called_ids(), vec!["a", "b", "c"]);
    assert_eq!(store.value(RETRY_QUEUE_KEY).await.as_deref(), Some("[]"));
}
