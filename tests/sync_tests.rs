mod common;

use calbridge::components::destination::CalendarApi;
use calbridge::components::source::{SourceOccurrence, SyncWindow};
use calbridge::components::store::StoreActorHandle;
use calbridge::components::sync::matcher::MatcherConfig;
use calbridge::components::sync::{SyncEngine, BATCH_SIZE};
use common::{destination_event, occurrence, MockCalendarApi, MockIcsFeed};
use std::sync::Arc;

fn window() -> SyncWindow {
    SyncWindow {
        start: "2024-08-01T00:00:00Z".parse().unwrap(),
        end: "2024-09-01T00:00:00Z".parse().unwrap(),
    }
}

fn engine(api: &Arc<MockCalendarApi>) -> SyncEngine {
    SyncEngine::new(
        Arc::clone(api) as Arc<dyn CalendarApi>,
        StoreActorHandle::empty(),
        "primary",
        chrono_tz::UTC,
    )
}

fn hourly_occurrences(count: usize) -> Vec<SourceOccurrence> {
    (0..count)
        .map(|i| {
            occurrence(
                &format!("m{}", i),
                &format!("Meeting {}", i),
                &format!("2024-08-15T{:02}:00:00", i % 24),
                &format!("2024-08-15T{:02}:30:00", i % 24),
            )
        })
        .collect()
}

#[tokio::test]
async fn empty_source_issues_no_destination_calls() {
    let api = Arc::new(MockCalendarApi::new());

    let report = engine(&api).reconcile(&[], window()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.events_processed, 0);
    assert_eq!(report.events_created, 0);
    assert_eq!(report.events_updated, 0);
    assert!(api.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn new_occurrences_are_created_in_order() {
    let api = Arc::new(MockCalendarApi::new());
    let occurrences = hourly_occurrences(3);

    let report = engine(&api).reconcile(&occurrences, window()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.events_created, 3);
    assert_eq!(report.events_updated, 0);
    assert_eq!(api.call_count("insert"), 3);
    assert_eq!(api.call_count("list"), 1);

    // Every created event carries the backlink to its source uid
    for event in api.events.lock().unwrap().iter() {
        assert!(event
            .description
            .as_deref()
            .unwrap()
            .contains("Original UID: m"));
    }
}

#[tokio::test]
async fn second_pass_updates_instead_of_creating() {
    let api = Arc::new(MockCalendarApi::new());
    let occurrences = hourly_occurrences(4);
    let engine = engine(&api);

    let first = engine.reconcile(&occurrences, window()).await.unwrap();
    assert_eq!(first.events_created, 4);

    let second = engine.reconcile(&occurrences, window()).await.unwrap();
    assert_eq!(second.events_created, 0);
    assert_eq!(second.events_updated, 4);
    assert_eq!(api.events.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn one_failing_create_does_not_stop_the_pass() {
    let api = Arc::new(MockCalendarApi::new());
    let occurrences = hourly_occurrences(7);
    api.fail_insert_titles
        .lock()
        .unwrap()
        .push("Meeting 2".to_string());

    let report = engine(&api).reconcile(&occurrences, window()).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.events_created, 6);
    assert_eq!(api.events.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn expired_credentials_abort_the_pass() {
    let api = Arc::new(MockCalendarApi::new());
    let occurrences = hourly_occurrences(12);
    api.auth_expired_titles
        .lock()
        .unwrap()
        .push("Meeting 0".to_string());

    let result = engine(&api).reconcile(&occurrences, window()).await;

    let err = result.unwrap_err();
    assert!(err.is_auth_expired());
    // Later batches were never dispatched
    assert!(api.call_count("insert") <= BATCH_SIZE);
}

#[tokio::test]
async fn backlinked_event_is_updated_not_duplicated() {
    let api = Arc::new(MockCalendarApi::with_events(vec![destination_event(
        "d1",
        "Planning",
        "2024-08-15T10:00:00Z",
        "2024-08-01T00:00:00Z",
        Some("agenda\n\nOriginal UID: m1"),
    )]));
    let occurrences = vec![occurrence(
        "m1",
        "Planning",
        "2024-08-15T10:00:00",
        "2024-08-15T11:00:00",
    )];

    let report = engine(&api).reconcile(&occurrences, window()).await.unwrap();

    assert_eq!(report.events_created, 0);
    assert_eq!(report.events_updated, 1);
    assert_eq!(api.call_count("update:d1"), 1);
    assert_eq!(api.events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn confidence_fallback_catches_events_without_backlinks() {
    // A destination event created before backlinks existed: no uid signal,
    // so only time, title and weak-location can contribute
    let api = Arc::new(MockCalendarApi::with_events(vec![destination_event(
        "legacy",
        "Planning",
        "2024-08-15T10:00:00Z",
        "2024-08-01T00:00:00Z",
        None,
    )]));
    let occurrences = vec![occurrence(
        "m1",
        "Planning",
        "2024-08-15T10:00:00",
        "2024-08-15T11:00:00",
    )];

    let engine = engine(&api).with_matcher(MatcherConfig {
        confidence_threshold: 0.5,
        ..Default::default()
    });
    let report = engine.reconcile(&occurrences, window()).await.unwrap();

    assert_eq!(report.events_created, 0);
    assert_eq!(report.events_updated, 1);
    assert_eq!(api.call_count("update:legacy"), 1);
}

#[tokio::test]
async fn unmatchable_occurrences_are_skipped_silently() {
    let api = Arc::new(MockCalendarApi::new());
    let blank = occurrence("", "Planning", "2024-08-15T10:00:00", "2024-08-15T11:00:00");

    let report = engine(&api).reconcile(&[blank], window()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.events_processed, 1);
    assert_eq!(report.events_created, 0);
    assert!(report.errors.is_empty());
    assert_eq!(api.call_count("insert"), 0);
}

#[tokio::test]
async fn large_windows_are_processed_completely() {
    let api = Arc::new(MockCalendarApi::new());
    let occurrences = hourly_occurrences(23);

    let report = engine(&api).reconcile(&occurrences, window()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.events_created, 23);
    assert_eq!(api.events.lock().unwrap().len(), 23);
}

#[tokio::test]
async fn run_pass_expands_the_feed_first() {
    let api = Arc::new(MockCalendarApi::new());
    let feed = MockIcsFeed {
        occurrences: hourly_occurrences(2),
    };

    let report = engine(&api).run_pass(&feed, window()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.events_processed, 2);
    assert_eq!(report.events_created, 2);
}
