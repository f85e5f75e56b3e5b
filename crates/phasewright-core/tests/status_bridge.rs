//! Tracker status → documentation page bridge.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use phasewright_core::agent::RetryPolicy;
use phasewright_core::bridge::SinkError;
use phasewright_core::{
    BridgeError, BridgeOutcome, MemoryDocumentationSink, PageMapping, StatusBridge,
    StatusChangeEvent,
};

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn event(key: &str, from: &str, to: &str, minutes: i64) -> StatusChangeEvent {
    StatusChangeEvent {
        item_key: key.to_string(),
        old_status: from.to_string(),
        new_status: to.to_string(),
        timestamp: at(minutes),
    }
}

fn bridge(sink: Arc<MemoryDocumentationSink>) -> StatusBridge {
    let mapping = PageMapping::new()
        .with_project("PAY", "payments-status")
        .with_item("OPS-9", "ops-runbook");
    StatusBridge::new(mapping, sink).with_retry(RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 50,
        max_backoff_ms: 200,
    })
}

#[tokio::test]
async fn applies_then_skips_duplicates_and_stale_events() {
    let sink = Arc::new(MemoryDocumentationSink::new());
    let bridge = bridge(Arc::clone(&sink));

    let first = event("PAY-142", "To Do", "In Progress", 0);
    assert_eq!(
        bridge.handle(&first).await.unwrap(),
        BridgeOutcome::Applied {
            page_id: "payments-status".into()
        }
    );
    assert_eq!(
        bridge.handle(&first).await.unwrap(),
        BridgeOutcome::SkippedDuplicate
    );

    let done = event("PAY-142", "In Progress", "Done", 10);
    bridge.handle(&done).await.unwrap();
    let late = event("PAY-142", "To Do", "In Review", 5);
    assert_eq!(
        bridge.handle(&late).await.unwrap(),
        BridgeOutcome::SkippedStale
    );

    assert_eq!(sink.status("payments-status", "PAY-142").as_deref(), Some("Done"));
    assert_eq!(sink.writes(), 2);
}

#[tokio::test]
async fn items_are_tracked_independently() {
    let sink = Arc::new(MemoryDocumentationSink::new());
    let bridge = bridge(Arc::clone(&sink));

    bridge.handle(&event("PAY-1", "To Do", "Done", 30)).await.unwrap();
    let outcome = bridge
        .handle(&event("OPS-9", "To Do", "Blocked", 0))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        BridgeOutcome::Applied {
            page_id: "ops-runbook".into()
        }
    );
    assert_eq!(sink.status("ops-runbook", "OPS-9").as_deref(), Some("Blocked"));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let sink = Arc::new(MemoryDocumentationSink::new());
    sink.fail_next(SinkError::Transient("429 rate limited".into()));
    sink.fail_next(SinkError::Transient("503".into()));
    let bridge = bridge(Arc::clone(&sink));

    let outcome = bridge
        .handle(&event("PAY-7", "To Do", "In Progress", 0))
        .await
        .unwrap();
    assert!(matches!(outcome, BridgeOutcome::Applied { .. }));
    assert_eq!(sink.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_are_bounded_and_failed_events_can_be_redelivered() {
    let sink = Arc::new(MemoryDocumentationSink::new());
    for _ in 0..3 {
        sink.fail_next(SinkError::Transient("timeout".into()));
    }
    let bridge = bridge(Arc::clone(&sink));
    let change = event("PAY-7", "To Do", "In Progress", 0);

    let err = bridge.handle(&change).await.unwrap_err();
    assert!(matches!(err, BridgeError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(sink.writes(), 0);

    assert!(matches!(
        bridge.handle(&change).await.unwrap(),
        BridgeOutcome::Applied { .. }
    ));
}

#[tokio::test]
async fn permanent_failures_and_unmapped_items_surface_immediately() {
    let sink = Arc::new(MemoryDocumentationSink::new());
    sink.fail_next(SinkError::Permanent("page is archived".into()));
    let bridge = bridge(Arc::clone(&sink));

    let err = bridge
        .handle(&event("PAY-7", "To Do", "Done", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Sink { .. }));

    let err = bridge
        .handle(&event("HR-3", "To Do", "Done", 0))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::UnmappedItem {
            item_key: "HR-3".into()
        }
    );
    assert_eq!(sink.writes(), 0);
}
