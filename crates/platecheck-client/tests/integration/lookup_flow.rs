use chrono::{Duration, Utc};
use platecheck_client::defrost::snapshot::{self, SnapshotPlate, parse_snapshot};
use platecheck_client::service::Caches;
use platecheck_core::cache::{CacheEntry, DiskStore, Freshness};
use platecheck_core::lookup::TracingLookupReporter;
use platecheck_core::models::{OutcomeKind, PlateCandidate, Provenance};
use platecheck_core::report::{format_detail, format_summary};
use platecheck_core::testutil::MockReply;
use uuid::Uuid;

use crate::integration::common::{
    META_FILE, PAGE_FILE, SNAPSHOT_URL, STOPICE_URL, lookup, lookup_with, settings, upstream,
};

/// Write a snapshot entry into the on-disk cache a later process would load.
fn persist_snapshot(dir: &std::path::Path, plates: Vec<SnapshotPlate>, freshness: Freshness) {
    let stored_at = Utc::now() - Duration::hours(4);
    DiskStore::new(dir.join("snapshot"))
        .store(snapshot::CACHE_KEY, &CacheEntry::new(plates, freshness, stored_at))
        .unwrap();
}

const OTHER_PLATE: &str = r#"{"plates": [{"license_plate": "XYZ9876", "records": []}]}"#;

fn candidate(raw: &str) -> PlateCandidate {
    PlateCandidate::typed(raw).unwrap()
}

#[tokio::test]
async fn dataset_match_with_clean_search_site() {
    let upstream = upstream();
    let settings = settings(&[("DEFROST_PLAINTEXT_PAGES", "true")]);
    let lookup = lookup(&settings, &upstream);

    let summary = lookup.search(candidate("abc-1234"), &TracingLookupReporter).await;

    assert_eq!(summary.sources[0].result.kind(), OutcomeKind::NotMatched);
    let record = summary.sources[1].result.record().unwrap();
    assert_eq!(record.status.values().cloned().collect::<Vec<_>>(), vec!["Confirmed"]);
    assert!(summary.interaction.is_some());

    let text = format_summary(&summary);
    assert!(text.contains("✔️ stopice.net — No match found."));
    assert!(text.contains("⚠️ defrostmn.net — MATCH FOUND — Confirmed"));
    assert!(text.ends_with("React 👀 to this message for full descriptions."));
}

#[tokio::test]
async fn no_key_skips_dataset_but_searches_snapshot() {
    let upstream = upstream();
    let settings = settings(&[("DEFROST_JSON_URL", SNAPSHOT_URL)]);
    let lookup = lookup(&settings, &upstream);

    let summary = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;

    let record = summary.sources[1].result.record().unwrap();
    assert_eq!(
        record.origins().into_iter().collect::<Vec<_>>(),
        vec![Provenance::Snapshot]
    );
    assert_eq!(upstream.call_count(META_FILE), 0);
    assert_eq!(upstream.call_count(SNAPSHOT_URL), 1);
}

#[tokio::test]
async fn nothing_configured_for_tracker() {
    let upstream = upstream();
    let lookup = lookup(&settings(&[]), &upstream);

    let summary = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;

    assert_eq!(summary.sources[1].result.kind(), OutcomeKind::Skipped);
    assert!(summary.interaction.is_none());
    let text = format_summary(&summary);
    assert!(text.contains("➖ defrostmn.net — Not checked (not configured)."));
}

#[tokio::test]
async fn search_site_timeouts_do_not_block_tracker() {
    let upstream = upstream().route(STOPICE_URL, MockReply::Timeout);
    let settings = settings(&[("DEFROST_PLAINTEXT_PAGES", "1")]);
    let lookup = lookup(&settings, &upstream);

    let summary = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;

    assert_eq!(summary.sources[0].result.kind(), OutcomeKind::Failed);
    assert_eq!(summary.sources[1].result.kind(), OutcomeKind::Matched);
    assert_eq!(upstream.call_count(STOPICE_URL), 3);
    assert!(format_summary(&summary).contains("❌ stopice.net — Error:"));
}

#[tokio::test]
async fn expand_without_matches_does_nothing() {
    let upstream = upstream();
    let lookup = lookup(&settings(&[]), &upstream);

    let summary = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;
    assert!(summary.interaction.is_none());
    let calls = upstream.total_calls();

    assert!(lookup.expand(Uuid::new_v4(), &TracingLookupReporter).await.is_none());
    assert_eq!(upstream.total_calls(), calls);
}

#[tokio::test]
async fn unchanged_version_fetches_pages_once() {
    let upstream = upstream();
    let settings = settings(&[("DEFROST_PLAINTEXT_PAGES", "true")]);
    let lookup = lookup(&settings, &upstream);

    let first = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;
    let second = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;

    assert!(first.any_match() && second.any_match());
    assert_eq!(upstream.call_count(META_FILE), 2);
    assert_eq!(upstream.call_count(PAGE_FILE), 1);
}

#[tokio::test]
async fn expand_fetches_details_once() {
    let upstream = upstream();
    let settings = settings(&[
        ("DEFROST_PLAINTEXT_PAGES", "true"),
        ("DEFROST_JSON_URL", SNAPSHOT_URL),
    ]);
    let lookup = lookup(&settings, &upstream);

    let summary = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;
    let interaction = summary.interaction.unwrap();

    let report = lookup
        .expand(interaction, &TracingLookupReporter)
        .await
        .unwrap();
    assert!(!report.retained);
    assert_eq!(report.sources.len(), 1);

    let text = format_detail(&report);
    assert!(text.starts_with("Details for ABC1234:"));
    assert!(text.contains("--- defrostmn.net ---"));
    assert!(text.contains("Location: Lake St"));
    assert!(text.contains("Location: Bloomington"));
    assert!(text.contains("Reported in: dataset"));

    assert!(lookup.expand(interaction, &TracingLookupReporter).await.is_none());
}

#[tokio::test]
async fn concurrent_expands_deliver_details_once() {
    let upstream = upstream();
    let settings = settings(&[("DEFROST_PLAINTEXT_PAGES", "true")]);
    let lookup = lookup(&settings, &upstream);

    let summary = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;
    let interaction = summary.interaction.unwrap();

    let (a, b) = tokio::join!(
        lookup.expand(interaction, &TracingLookupReporter),
        lookup.expand(interaction, &TracingLookupReporter)
    );
    assert_eq!(usize::from(a.is_some()) + usize::from(b.is_some()), 1);
    assert!(lookup.expand(interaction, &TracingLookupReporter).await.is_none());
}

#[tokio::test]
async fn expired_snapshot_on_disk_is_refetched_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    persist_snapshot(
        dir.path(),
        parse_snapshot(OTHER_PLATE).unwrap(),
        Freshness::Expires(Utc::now() - Duration::hours(1)),
    );

    let upstream = upstream();
    let settings = settings(&[
        ("DEFROST_JSON_URL", SNAPSHOT_URL),
        ("CACHE_DIR", dir.path().to_str().unwrap()),
    ]);
    let caches = Caches::from_settings(&settings).await;
    let lookup = lookup_with(&settings, &upstream, &caches);

    let summary = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;
    assert_eq!(summary.sources[1].result.kind(), OutcomeKind::Matched);
    assert_eq!(upstream.call_count(SNAPSHOT_URL), 1);

    let entry = caches.snapshot.get(snapshot::CACHE_KEY).await.unwrap();
    assert!(entry.freshness.is_fresh(Utc::now(), None));
}

#[tokio::test]
async fn fresh_snapshot_on_disk_is_served_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    persist_snapshot(
        dir.path(),
        parse_snapshot(OTHER_PLATE).unwrap(),
        Freshness::Expires(Utc::now() + Duration::hours(1)),
    );

    let upstream = upstream();
    let settings = settings(&[
        ("DEFROST_JSON_URL", SNAPSHOT_URL),
        ("CACHE_DIR", dir.path().to_str().unwrap()),
    ]);
    let caches = Caches::from_settings(&settings).await;
    let lookup = lookup_with(&settings, &upstream, &caches);

    let summary = lookup.search(candidate("ABC1234"), &TracingLookupReporter).await;
    assert_eq!(summary.sources[1].result.kind(), OutcomeKind::NotMatched);
    assert_eq!(upstream.call_count(SNAPSHOT_URL), 0);
}
