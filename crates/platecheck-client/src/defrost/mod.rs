//! Community tracker ("defrost").
//!
//! The tracker exposes two datasets that are searched together and merged:
//! a paginated, usually encrypted dataset and a legacy JSON snapshot. Either
//! may be unconfigured, in which case it reports [`SourceResult::Skipped`].

mod lenient;
pub mod merge;
pub mod paginated;
pub mod snapshot;

use platecheck_core::config::Capability;
use platecheck_core::error::AppError;
use platecheck_core::models::{PlateCandidate, PlateRecord, SourceResult};
use platecheck_core::traits::{Fetcher, PlateSource};

pub use merge::merge_outcomes;
pub use paginated::{PageReader, PaginatedDataset};
pub use snapshot::SnapshotSource;

pub const SOURCE_NAME: &str = "defrostmn.net";

#[derive(Clone)]
pub struct DefrostSource<F: Fetcher> {
    dataset: Capability<PaginatedDataset<F>>,
    snapshot: Capability<SnapshotSource<F>>,
}

impl<F: Fetcher> DefrostSource<F> {
    pub fn new(
        dataset: Capability<PaginatedDataset<F>>,
        snapshot: Capability<SnapshotSource<F>>,
    ) -> Self {
        Self { dataset, snapshot }
    }

    pub fn dataset(&self) -> Option<&PaginatedDataset<F>> {
        self.dataset.as_ref().configured()
    }

    pub fn snapshot(&self) -> Option<&SnapshotSource<F>> {
        self.snapshot.as_ref().configured()
    }

    /// Both sub-source outcomes, unmerged: `(dataset, snapshot)`.
    pub async fn search_each(&self, candidate: &PlateCandidate) -> (SourceResult, SourceResult) {
        let dataset = async {
            match self.dataset() {
                Some(dataset) => dataset.search(candidate).await,
                None => SourceResult::Skipped,
            }
        };
        let snapshot = async {
            match self.snapshot() {
                Some(snapshot) => snapshot.search(candidate).await,
                None => SourceResult::Skipped,
            }
        };
        tokio::join!(dataset, snapshot)
    }
}

impl<F: Fetcher> PlateSource for DefrostSource<F> {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn search(&self, candidate: &PlateCandidate) -> SourceResult {
        let (dataset, snapshot) = self.search_each(candidate).await;
        tracing::debug!(
            plate = %candidate,
            dataset = %dataset.kind(),
            snapshot = %snapshot.kind(),
            "Sub-sources finished"
        );
        merge_outcomes(dataset, snapshot)
    }

    /// Both datasets already hold the full record, so the detail is a fresh
    /// merged search.
    async fn fetch_detail(&self, record: &PlateRecord) -> Result<PlateRecord, AppError> {
        let candidate = PlateCandidate::typed(&record.plate)
            .map_err(|e| AppError::InvalidRequest(format!("plate {:?}: {e}", record.plate)))?;
        match self.search(&candidate).await {
            SourceResult::Match(record) => Ok(record),
            SourceResult::Error(e) => Err(e),
            SourceResult::NoMatch | SourceResult::Skipped => {
                Err(AppError::NotListed(record.plate.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use platecheck_core::cache::CacheLayer;
    use platecheck_core::models::{OutcomeKind, Provenance};
    use platecheck_core::testutil::{MockFetcher, MockReply};

    use super::*;

    const BASE: &str = "https://defrost.test/data/plates";
    const SNAPSHOT_URL: &str = "https://defrost.test/stopice.json";

    const PAGE: &str = r#"{"records": [{"fields": {"Plate": "ABC1234",
        "Plate Status": ["Confirmed"],
        "Last Seen": "2026-01-27T00:00:00Z", "Last Location Seen": "Lake St"}}]}"#;
    const SNAPSHOT: &str = r#"{"plates": [{"license_plate": "ABC1234", "records": [
        {"month": "Jan", "day": "29", "year": "2026", "address": "Bloomington"}]}]}"#;

    fn fetcher() -> MockFetcher {
        MockFetcher::new()
            .route(
                paginated::META_FILE,
                MockReply::body(r#"{"rotation": 1, "numPages": 1, "updated": "u1"}"#),
            )
            .route("Plates_r1_p1.json", MockReply::body(PAGE))
            .route(SNAPSHOT_URL, MockReply::body(SNAPSHOT))
    }

    fn dataset(fetcher: &MockFetcher) -> Capability<PaginatedDataset<MockFetcher>> {
        Capability::Configured(PaginatedDataset::new(
            fetcher.clone(),
            BASE,
            PageReader::Plaintext,
            CacheLayer::in_memory("pages"),
        ))
    }

    fn snapshot(fetcher: &MockFetcher) -> Capability<SnapshotSource<MockFetcher>> {
        Capability::Configured(SnapshotSource::new(
            fetcher.clone(),
            SNAPSHOT_URL,
            CacheLayer::in_memory("snapshot"),
        ))
    }

    fn candidate() -> PlateCandidate {
        PlateCandidate::typed("ABC1234").unwrap()
    }

    #[tokio::test]
    async fn merges_both_datasets() {
        let fetcher = fetcher();
        let source = DefrostSource::new(dataset(&fetcher), snapshot(&fetcher));

        let result = source.search(&candidate()).await;
        let record = result.record().unwrap();
        assert_eq!(record.sightings.len(), 2);
        assert!(record.origins().contains(&Provenance::PaginatedDataset));
        assert!(record.origins().contains(&Provenance::Snapshot));
    }

    #[tokio::test]
    async fn unconfigured_sub_sources_are_skipped() {
        let fetcher = fetcher();
        let source = DefrostSource::new(Capability::Unconfigured, snapshot(&fetcher));
        let (dataset, snapshot) = source.search_each(&candidate()).await;
        assert_eq!(dataset.kind(), OutcomeKind::Skipped);
        assert_eq!(snapshot.kind(), OutcomeKind::Matched);
        assert_eq!(fetcher.call_count(paginated::META_FILE), 0);

        let nothing: DefrostSource<MockFetcher> =
            DefrostSource::new(Capability::Unconfigured, Capability::Unconfigured);
        assert_eq!(nothing.search(&candidate()).await.kind(), OutcomeKind::Skipped);
    }

    #[tokio::test]
    async fn detail_reruns_search() {
        let fetcher = fetcher();
        let source = DefrostSource::new(dataset(&fetcher), Capability::Unconfigured);
        let record = source.search(&candidate()).await.record().cloned().unwrap();

        let detail = source.fetch_detail(&record).await.unwrap();
        assert_eq!(detail, record);
        assert_eq!(fetcher.call_count(paginated::META_FILE), 2);
    }

    #[tokio::test]
    async fn detail_for_delisted_plate() {
        let fetcher = fetcher().route("Plates_r1_p1.json", MockReply::body(r#"{"records": []}"#));
        let source = DefrostSource::new(dataset(&fetcher), Capability::Unconfigured);
        let err = source
            .fetch_detail(&PlateRecord::new("ABC1234"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotListed(_)));
    }
}
