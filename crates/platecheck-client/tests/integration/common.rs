use std::collections::HashMap;

use platecheck_client::defrost::DefrostSource;
use platecheck_client::service::{Caches, defrost_source, stopice_source};
use platecheck_client::stopice::StopIceSource;
use platecheck_core::config::Settings;
use platecheck_core::lookup::LookupService;
use platecheck_core::retry::{RetryPolicy, RetryingFetcher};
use platecheck_core::testutil::{MockFetcher, MockReply};

pub const STOPICE_URL: &str = "https://stopice.test/platetracker/index.cgi";
pub const DATA_URL: &str = "https://defrost.test/data/plates";
pub const SNAPSHOT_URL: &str = "https://defrost.test/stopice.json";

pub const META: &str = r#"{"rotation": 1, "numPages": 1, "updated": "2026-02-01T00:00:00Z"}"#;
pub const META_FILE: &str = "Plates_meta.json";
pub const PAGE_FILE: &str = "Plates_r1_p1.json";

pub const NO_RESULTS: &str = "<html><body>No results<!--RESULT:0--></body></html>";

pub const PAGE: &str = r#"{"records": [
    {"fields": {"Plate": "ABC1234", "Plate Status": ["Confirmed"], "Reports Count": 2,
                "Last Seen": "2026-01-27T19:30:00.000Z", "Last Location Seen": "Lake St",
                "Vehicle Description": "Grey Tahoe"}}
]}"#;

pub const SNAPSHOT: &str = r#"{"plates": [
    {"license_plate": "ABC1234", "records": [
        {"month": "Jan", "day": "29", "year": "2026", "address": "Bloomington",
         "comments": "Parked at the transit center"}
    ]}
]}"#;

pub type TestFetcher = RetryingFetcher<MockFetcher>;
pub type TestLookup = LookupService<StopIceSource<TestFetcher>, DefrostSource<TestFetcher>>;

pub fn settings(extra: &[(&str, &str)]) -> Settings {
    let mut vars: HashMap<String, String> = [
        ("STOPICE_URL", STOPICE_URL),
        ("DEFROST_DATA_URL", DATA_URL),
    ]
    .iter()
    .chain(extra)
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    vars.insert("PLATECHECK_SOURCE_TIMEOUT_SECS".into(), "5".into());
    Settings::from_vars(|name| vars.get(name).cloned()).unwrap()
}

/// Upstream with no match on the search site, a plaintext dataset holding
/// ABC1234 and a snapshot holding it as well.
pub fn upstream() -> MockFetcher {
    MockFetcher::new()
        .route(STOPICE_URL, MockReply::body(NO_RESULTS))
        .route(META_FILE, MockReply::body(META))
        .route(PAGE_FILE, MockReply::body(PAGE))
        .route(SNAPSHOT_URL, MockReply::body(SNAPSHOT))
}

pub fn lookup(settings: &Settings, upstream: &MockFetcher) -> TestLookup {
    lookup_with(settings, upstream, &Caches::in_memory())
}

pub fn lookup_with(settings: &Settings, upstream: &MockFetcher, caches: &Caches) -> TestLookup {
    let fetcher = RetryingFetcher::new(
        upstream.clone(),
        RetryPolicy::immediate(settings.max_attempts),
    );
    LookupService::new(
        stopice_source(settings, fetcher.clone()),
        defrost_source(settings, fetcher, caches),
        settings.lookup_config(),
    )
}
