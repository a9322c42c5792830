//! Suite de conformidad compartida por todos los adapters.
//!
//! Cada backend la ejecuta contra una instancia ya conectada. `new_ref`
//! genera refs frescos con el formato que el backend acepte (p.ej. ObjectId
//! hex para el backend documental), de modo que las corridas no se pisen.

use serde_json::json;

use crate::adapter::StorageAdapter;
use crate::error::JournalError;
use crate::model::{NewEvent, Version, VersionRange};

pub async fn run_all<A, F>(adapter: &A, new_ref: F)
    where A: StorageAdapter + ?Sized,
          F: Fn() -> String
{
    versions_are_monotonic(adapter, &new_ref()).await;
    latest_version_of_unknown_ref_is_zero(adapter, &new_ref()).await;
    duplicate_expected_version_conflicts(adapter, &new_ref()).await;
    concurrent_appends_have_one_winner(adapter, &new_ref()).await;
    range_filter_is_inclusive(adapter, &new_ref()).await;
    refs_are_isolated(adapter, &new_ref(), &new_ref()).await;
    event_fields_round_trip(adapter, &new_ref()).await;
}

pub async fn versions_are_monotonic<A: StorageAdapter + ?Sized>(adapter: &A, reference: &str) {
    for i in 1..=5u64 {
        let ev = adapter.append_event(NewEvent::new(format!("E{i}"), reference)).await.expect("append");
        assert_eq!(ev.version, i, "sequential append must yield version {i}");
    }
    let versions: Vec<Version> = adapter.list_events(reference, VersionRange::all())
                                        .await
                                        .expect("list")
                                        .iter()
                                        .map(|e| e.version)
                                        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    assert_eq!(adapter.latest_version(reference).await.expect("latest"), 5);
}

pub async fn latest_version_of_unknown_ref_is_zero<A: StorageAdapter + ?Sized>(adapter: &A, reference: &str) {
    assert_eq!(adapter.latest_version(reference).await.expect("latest"), 0);
    assert!(adapter.list_events(reference, VersionRange::all()).await.expect("list").is_empty());
}

pub async fn duplicate_expected_version_conflicts<A: StorageAdapter + ?Sized>(adapter: &A, reference: &str) {
    let first = adapter.append_event(NewEvent::new("E", reference).with_payload(json!({})).expecting(1))
                       .await
                       .expect("first append");
    assert_eq!(first.version, 2);
    let err = adapter.append_event(NewEvent::new("E", reference).with_payload(json!({})).expecting(1))
                     .await
                     .expect_err("second append must conflict");
    match err {
        JournalError::Conflict { reference: r, expected_version, actual_version } => {
            assert_eq!(r, reference);
            assert_eq!(expected_version, 1);
            assert_eq!(actual_version, 2);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    // El fallo no altera la última versión.
    assert_eq!(adapter.latest_version(reference).await.expect("latest"), 2);
}

pub async fn concurrent_appends_have_one_winner<A: StorageAdapter + ?Sized>(adapter: &A, reference: &str) {
    adapter.append_event(NewEvent::new("Seed", reference)).await.expect("seed");
    let (a, b) = futures::join!(adapter.append_event(NewEvent::new("A", reference).expecting(1)),
                                adapter.append_event(NewEvent::new("B", reference).expecting(1)));
    let (winner, loser) = match (a, b) {
        (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
        (a, b) => panic!("expected exactly one winner, got {a:?} / {b:?}"),
    };
    assert_eq!(winner.version, 2);
    assert!(matches!(loser, JournalError::Conflict { expected_version: 1, actual_version: 2, .. }),
            "loser must observe conflict, got {loser:?}");
    let events = adapter.list_events(reference, VersionRange::all()).await.expect("list");
    assert_eq!(events.len(), 2);
}

pub async fn range_filter_is_inclusive<A: StorageAdapter + ?Sized>(adapter: &A, reference: &str) {
    for _ in 0..6 {
        adapter.append_event(NewEvent::new("E", reference)).await.expect("append");
    }
    let cases: [(Option<Version>, Option<Version>, Vec<Version>); 8] = [(None, None, vec![1, 2, 3, 4, 5, 6]),
                                                                        (Some(3), None, vec![3, 4, 5, 6]),
                                                                        (None, Some(2), vec![1, 2]),
                                                                        (Some(2), Some(4), vec![2, 3, 4]),
                                                                        (Some(4), Some(4), vec![4]),
                                                                        (Some(7), None, vec![]),
                                                                        (Some(u64::MAX), None, vec![]),
                                                                        (Some(5), Some(u64::MAX), vec![5, 6])];
    for (from, to, expected) in cases {
        let got: Vec<Version> = adapter.list_events(reference, VersionRange::new(from, to))
                                       .await
                                       .expect("list")
                                       .iter()
                                       .map(|e| e.version)
                                       .collect();
        assert_eq!(got, expected, "range {from:?}..={to:?}");
    }
}

pub async fn refs_are_isolated<A: StorageAdapter + ?Sized>(adapter: &A, left: &str, right: &str) {
    adapter.append_event(NewEvent::new("L", left)).await.expect("left");
    adapter.append_event(NewEvent::new("L", left)).await.expect("left");
    let ev = adapter.append_event(NewEvent::new("R", right)).await.expect("right");
    assert_eq!(ev.version, 1);
    assert_eq!(adapter.latest_version(left).await.expect("latest"), 2);
    let right_events = adapter.list_events(right, VersionRange::all()).await.expect("list");
    assert!(right_events.iter().all(|e| e.reference == right));
}

pub async fn event_fields_round_trip<A: StorageAdapter + ?Sized>(adapter: &A, reference: &str) {
    let payload = json!({"a": 1, "tags": ["x", "y"], "nested": {"ok": true}});
    let stored = adapter.append_event(NewEvent::new("Created", reference).with_payload(payload.clone())
                                                                          .initiated_by("alice"))
                        .await
                        .expect("append");
    adapter.append_event(NewEvent::new("Touched", reference)).await.expect("append");
    let events = adapter.list_events(reference, VersionRange::all()).await.expect("list");
    assert_eq!(events[0].event, "Created");
    assert_eq!(events[0].payload.as_ref(), Some(&payload));
    assert_eq!(events[0].initiated_by.as_deref(), Some("alice"));
    assert_eq!(events[0].version, stored.version);
    assert_eq!(events[1].payload, None);
    assert_eq!(events[1].initiated_by, None);
    assert!(events[1].created_on >= events[0].created_on);
}
