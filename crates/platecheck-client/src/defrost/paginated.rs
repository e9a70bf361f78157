//! Paginated plate dataset.
//!
//! Upstream publishes `Plates_meta.json` describing the current rotation and
//! page count, then one `Plates_r{rotation}_p{n}.json` file per page. Pages are
//! AES-GCM envelopes unless the operator declared them plaintext. The combined
//! records are cached until the metadata advertises a different version.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use platecheck_core::cache::{CacheEntry, CacheLayer, Freshness};
use platecheck_core::config::PageMode;
use platecheck_core::error::AppError;
use platecheck_core::models::{
    PlateCandidate, PlateRecord, Provenance, Sighting, SourceResult, compute_hash, normalize_plate,
};
use platecheck_core::request::HttpRequest;
use platecheck_core::traits::Fetcher;
use serde::{Deserialize, Serialize};

use super::lenient;
use crate::crypto::{EncryptedPage, PageCipher};

pub const CACHE_KEY: &str = "defrost-pages";
pub const META_FILE: &str = "Plates_meta.json";

/// Upper bound on page requests in flight.
pub const MAX_CONCURRENT_PAGES: usize = 10;

/// Refuse metadata claiming more pages than this.
const MAX_PAGES: u32 = 1_000;

fn default_rotation() -> String {
    "1".to_string()
}

fn default_num_pages() -> Option<u32> {
    Some(1)
}

/// Contents of `Plates_meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatasetMeta {
    #[serde(default = "default_rotation", deserialize_with = "lenient::string")]
    pub rotation: String,
    #[serde(
        rename = "numPages",
        default = "default_num_pages",
        deserialize_with = "lenient::count"
    )]
    pub num_pages: Option<u32>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub updated: String,
}

impl DatasetMeta {
    pub fn parse(body: &str) -> Result<Self, AppError> {
        let meta: DatasetMeta = serde_json::from_str(body)
            .map_err(|e| AppError::MalformedResponse(format!("invalid dataset metadata: {e}")))?;
        match meta.num_pages {
            Some(n) if n <= MAX_PAGES => Ok(meta),
            Some(n) => Err(AppError::MalformedResponse(format!(
                "dataset metadata claims {n} pages (limit {MAX_PAGES})"
            ))),
            None => Err(AppError::MalformedResponse(
                "dataset metadata has no usable numPages".into(),
            )),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.num_pages.unwrap_or_default()
    }

    /// Hash of everything that identifies one published version.
    pub fn version_token(&self) -> String {
        compute_hash(&format!(
            "{}|{}|{}",
            self.updated,
            self.rotation,
            self.page_count()
        ))
    }
}

/// Fields of one dataset record. Only the columns this tool reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFields {
    #[serde(rename = "Plate", default, deserialize_with = "lenient::string")]
    pub plate: String,
    #[serde(rename = "Plate Status", default, deserialize_with = "lenient::string_list")]
    pub status: Vec<String>,
    #[serde(rename = "Reports Count", default, deserialize_with = "lenient::count")]
    pub reports_count: Option<u32>,
    #[serde(rename = "Last Seen", default, deserialize_with = "lenient::string")]
    pub last_seen: String,
    #[serde(rename = "Last Location Seen", default, deserialize_with = "lenient::string")]
    pub last_location: String,
    #[serde(rename = "Vehicle Description", default, deserialize_with = "lenient::string")]
    pub vehicle_description: String,
    #[serde(rename = "Unique vehicles", default, deserialize_with = "lenient::string")]
    pub unique_vehicles: String,
    #[serde(rename = "Tags", default, deserialize_with = "lenient::string")]
    pub tags: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    #[serde(default)]
    pub fields: DatasetFields,
}

#[derive(Debug, Deserialize)]
struct DatasetPage {
    #[serde(default)]
    records: Vec<DatasetRecord>,
}

/// Render an upstream ISO timestamp as `Jan 27, 2026`. Input that is not a
/// timestamp is returned unchanged.
pub fn format_iso_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let date = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"));
    match date {
        Ok(date) => date.format("%b %d, %Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl DatasetFields {
    pub fn to_sighting(&self) -> Sighting {
        let vehicle =
            non_empty(&self.vehicle_description).or_else(|| non_empty(&self.unique_vehicles));

        let mut description = self.status.join(" / ");
        if !self.tags.is_empty() {
            if !description.is_empty() {
                description.push_str(" | ");
            }
            description.push_str(&self.tags);
        }

        Sighting {
            date: format_iso_date(&self.last_seen),
            time: None,
            location: self.last_location.clone(),
            vehicle,
            description: non_empty(&description),
        }
    }

    pub fn to_record(&self) -> PlateRecord {
        let origin = Provenance::PaginatedDataset;
        let mut record = PlateRecord::new(normalize_plate(&self.plate));
        if !self.status.is_empty() {
            record.status.insert(self.status.join(" / "), origin);
        }
        record
            .report_count
            .insert(self.reports_count.unwrap_or(1), origin);
        record.sightings.push(self.to_sighting(), origin);
        record
    }
}

/// Every record for the candidate, merged. `None` when the plate is absent.
pub fn find_plate(records: &[DatasetRecord], candidate: &PlateCandidate) -> Option<PlateRecord> {
    records
        .iter()
        .filter(|r| candidate.matches(&r.fields.plate))
        .map(|r| r.fields.to_record())
        .reduce(PlateRecord::merge)
}

/// How page bodies become page JSON.
#[derive(Debug, Clone)]
pub enum PageReader {
    Encrypted(PageCipher),
    Plaintext,
}

impl PageReader {
    pub fn from_mode(mode: &PageMode) -> Self {
        match mode {
            PageMode::Encrypted(secret) => PageReader::Encrypted(PageCipher::new(secret.clone())),
            PageMode::Plaintext => PageReader::Plaintext,
        }
    }

    async fn read(&self, body: String) -> Result<String, AppError> {
        match self {
            PageReader::Encrypted(cipher) => {
                let page = EncryptedPage::from_json(&body)?;
                cipher.decrypt_blocking(page).await
            }
            PageReader::Plaintext => Ok(body),
        }
    }
}

/// Dataset sub-source bound to a fetcher and a cache.
#[derive(Clone)]
pub struct PaginatedDataset<F: Fetcher> {
    fetcher: F,
    base_url: String,
    reader: PageReader,
    cache: CacheLayer<Vec<DatasetRecord>>,
}

impl<F: Fetcher> PaginatedDataset<F> {
    pub fn new(
        fetcher: F,
        base_url: impl Into<String>,
        reader: PageReader,
        cache: CacheLayer<Vec<DatasetRecord>>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            reader,
            cache,
        }
    }

    pub fn cache(&self) -> &CacheLayer<Vec<DatasetRecord>> {
        &self.cache
    }

    pub fn meta_url(&self) -> String {
        format!("{}/{META_FILE}", self.base_url)
    }

    pub fn page_url(&self, rotation: &str, page: u32) -> String {
        format!("{}/Plates_r{rotation}_p{page}.json", self.base_url)
    }

    pub async fn fetch_meta(&self) -> Result<DatasetMeta, AppError> {
        let body = self.fetcher.fetch(&HttpRequest::get(self.meta_url())).await?;
        DatasetMeta::parse(&body)
    }

    async fn load_page(&self, rotation: &str, page: u32) -> Result<Vec<DatasetRecord>, AppError> {
        let body = self
            .fetcher
            .fetch(&HttpRequest::get(self.page_url(rotation, page)))
            .await?;
        let json = self.reader.read(body).await?;
        let page: DatasetPage = serde_json::from_str(&json).map_err(|e| {
            AppError::MalformedResponse(format!("page {page} is not a record list: {e}"))
        })?;
        Ok(page.records)
    }

    /// Fetch and read one page.
    pub async fn fetch_page(
        &self,
        rotation: &str,
        page: u32,
    ) -> Result<Vec<DatasetRecord>, AppError> {
        let result = self.load_page(rotation, page).await;
        if let Err(e) = &result {
            tracing::warn!(page, error = %e, "Dataset page failed");
        }
        result
    }

    /// Every page of the published version, in page order. Fails on the first
    /// page that fails.
    pub async fn fetch_all(&self, meta: &DatasetMeta) -> Result<Vec<DatasetRecord>, AppError> {
        let pages: Vec<Vec<DatasetRecord>> = stream::iter(1..=meta.page_count())
            .map(|page| self.fetch_page(&meta.rotation, page))
            .buffered(MAX_CONCURRENT_PAGES)
            .try_collect()
            .await?;
        let records: Vec<DatasetRecord> = pages.into_iter().flatten().collect();
        tracing::info!(
            pages = meta.page_count(),
            records = records.len(),
            rotation = %meta.rotation,
            "Fetched dataset"
        );
        Ok(records)
    }

    /// Current dataset: cached while the advertised version is unchanged.
    ///
    /// When the metadata cannot be fetched no newer version is known, so the
    /// cached dataset is still served.
    pub async fn records(&self) -> Result<Arc<CacheEntry<Vec<DatasetRecord>>>, AppError> {
        let now = Utc::now();
        let meta = match self.fetch_meta().await {
            Ok(meta) => meta,
            Err(e) => {
                return match self.cache.get_fresh(CACHE_KEY, now, None).await {
                    Some(entry) => {
                        tracing::warn!(
                            error = %e,
                            "Dataset metadata unavailable, searching cached dataset"
                        );
                        Ok(entry)
                    }
                    None => Err(e),
                };
            }
        };

        let token = meta.version_token();
        let (meta_ref, token_ref) = (&meta, &token);
        self.cache
            .get_or_fetch(CACHE_KEY, now, Some(token.as_str()), move || async move {
                let records = self.fetch_all(meta_ref).await?;
                Ok::<_, AppError>((records, Freshness::Version(token_ref.clone())))
            })
            .await
    }

    pub async fn search(&self, candidate: &PlateCandidate) -> SourceResult {
        match self.records().await {
            Ok(entry) => match find_plate(&entry.payload, candidate) {
                Some(record) => SourceResult::Match(record),
                None => SourceResult::NoMatch,
            },
            Err(e) => {
                tracing::warn!(plate = %candidate, error = %e, "Dataset search failed");
                SourceResult::Error(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use platecheck_core::config::Secret;
    use platecheck_core::error::DecryptError;
    use platecheck_core::models::OutcomeKind;
    use platecheck_core::testutil::{MockFetcher, MockReply};

    use super::*;
    use crate::crypto::encrypt_page;

    const BASE: &str = "https://defrost.test/data/plates";
    const META: &str = r#"{"rotation": 2, "numPages": 2, "updated": "2026-02-01T00:00:00Z"}"#;
    const ROUNDS: u32 = 1_000;

    const PAGE_ONE: &str = r#"{"records": [
        {"fields": {"Plate": "ABC1234", "Plate Status": ["Confirmed"], "Reports Count": 3,
                    "Last Seen": "2026-01-27T19:30:00.000Z", "Last Location Seen": "Lake St",
                    "Vehicle Description": "Grey Tahoe", "Tags": "ICE"}}
    ]}"#;
    const PAGE_TWO: &str = r#"{"records": [
        {"fields": {"Plate": "XYZ9876", "Plate Status": "Unconfirmed",
                    "Unique vehicles": "Black Explorer"}}
    ]}"#;

    fn cipher() -> PageReader {
        PageReader::Encrypted(PageCipher::with_rounds(Secret::new("pass"), ROUNDS))
    }

    fn encrypted(plaintext: &str) -> MockReply {
        MockReply::body(serde_json::to_string(&encrypt_page(plaintext, "pass", ROUNDS)).unwrap())
    }

    fn dataset(fetcher: MockFetcher, reader: PageReader) -> PaginatedDataset<MockFetcher> {
        PaginatedDataset::new(fetcher, BASE, reader, CacheLayer::in_memory("pages"))
    }

    fn candidate(raw: &str) -> PlateCandidate {
        PlateCandidate::typed(raw).unwrap()
    }

    fn live_fetcher() -> MockFetcher {
        MockFetcher::new()
            .route(META_FILE, MockReply::body(META))
            .route("Plates_r2_p1.json", encrypted(PAGE_ONE))
            .route("Plates_r2_p2.json", encrypted(PAGE_TWO))
    }

    #[test]
    fn iso_dates_render_short_month() {
        assert_eq!(format_iso_date("2026-01-27T19:30:00.000Z"), "Jan 27, 2026");
        assert_eq!(format_iso_date("2026-01-27T19:30:00"), "Jan 27, 2026");
        assert_eq!(format_iso_date("2026-01-27"), "Jan 27, 2026");
        assert_eq!(format_iso_date("last tuesday"), "last tuesday");
        assert_eq!(format_iso_date(""), "");
    }

    #[test]
    fn version_token_covers_all_fields() {
        let meta = DatasetMeta::parse(META).unwrap();
        let rotated = DatasetMeta {
            rotation: "3".into(),
            ..meta.clone()
        };
        let updated = DatasetMeta {
            updated: "2026-02-02T00:00:00Z".into(),
            ..meta.clone()
        };
        assert_eq!(meta.version_token(), DatasetMeta::parse(META).unwrap().version_token());
        assert_ne!(meta.version_token(), rotated.version_token());
        assert_ne!(meta.version_token(), updated.version_token());
    }

    #[test]
    fn meta_defaults_and_limits() {
        let meta = DatasetMeta::parse(r#"{"updated": "x"}"#).unwrap();
        assert_eq!(meta.rotation, "1");
        assert_eq!(meta.page_count(), 1);
        assert!(DatasetMeta::parse(r#"{"numPages": "lots"}"#).is_err());
        assert!(DatasetMeta::parse(r#"{"numPages": 5000}"#).is_err());
        assert!(DatasetMeta::parse("not json").is_err());
    }

    #[test]
    fn record_fields_become_sighting() {
        let page: DatasetPage = serde_json::from_str(PAGE_ONE).unwrap();
        let record = page.records[0].fields.to_record();
        assert_eq!(record.plate, "ABC1234");
        assert_eq!(record.status.values().cloned().collect::<Vec<_>>(), vec!["Confirmed"]);
        assert_eq!(record.report_count.values().copied().collect::<Vec<_>>(), vec![3]);

        let sighting = &record.sightings.iter().next().unwrap().value;
        assert_eq!(sighting.date, "Jan 27, 2026");
        assert_eq!(sighting.location, "Lake St");
        assert_eq!(sighting.vehicle.as_deref(), Some("Grey Tahoe"));
        assert_eq!(sighting.description.as_deref(), Some("Confirmed | ICE"));
    }

    #[test]
    fn vehicle_falls_back_to_unique_vehicles() {
        let page: DatasetPage = serde_json::from_str(PAGE_TWO).unwrap();
        let record = page.records[0].fields.to_record();
        let sighting = &record.sightings.iter().next().unwrap().value;
        assert_eq!(sighting.vehicle.as_deref(), Some("Black Explorer"));
        assert_eq!(sighting.description.as_deref(), Some("Unconfirmed"));
        assert_eq!(record.report_count.values().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn finds_plate_across_pages() {
        let source = dataset(live_fetcher(), cipher());
        let result = source.search(&candidate("xyz-9876")).await;
        assert_eq!(result.record().unwrap().plate, "XYZ9876");
        assert_eq!(source.search(&candidate("NOPE1")).await.kind(), OutcomeKind::NotMatched);
    }

    #[tokio::test]
    async fn unchanged_version_reuses_cache() {
        let fetcher = live_fetcher();
        let source = dataset(fetcher.clone(), cipher());

        source.search(&candidate("ABC1234")).await;
        source.search(&candidate("ABC1234")).await;

        assert_eq!(fetcher.call_count(META_FILE), 2);
        assert_eq!(fetcher.call_count("Plates_r2_p1.json"), 1);
        assert_eq!(fetcher.call_count("Plates_r2_p2.json"), 1);
    }

    #[tokio::test]
    async fn new_version_refetches() {
        let fetcher = live_fetcher().route("Plates_r3_p1.json", encrypted(PAGE_TWO));
        let source = dataset(fetcher.clone(), cipher());
        source.search(&candidate("ABC1234")).await;

        fetcher.set_route(
            META_FILE,
            vec![MockReply::body(
                r#"{"rotation": 3, "numPages": 1, "updated": "2026-02-02T00:00:00Z"}"#,
            )],
        );
        let result = source.search(&candidate("ABC1234")).await;

        assert_eq!(result.kind(), OutcomeKind::NotMatched);
        assert_eq!(fetcher.call_count("Plates_r3_p1.json"), 1);
    }

    #[tokio::test]
    async fn page_failure_caches_nothing() {
        let fetcher = live_fetcher().route("Plates_r2_p2.json", MockReply::Status(500));
        let source = dataset(fetcher, cipher());

        let result = source.search(&candidate("ABC1234")).await;
        assert!(matches!(result, SourceResult::Error(AppError::HttpStatus { status: 500 })));
        assert!(source.cache().get(CACHE_KEY).await.is_none());
    }

    #[tokio::test]
    async fn wrong_key_is_decrypt_error() {
        let reader = PageReader::Encrypted(PageCipher::with_rounds(Secret::new("other"), ROUNDS));
        let source = dataset(live_fetcher(), reader);
        let result = source.search(&candidate("ABC1234")).await;
        assert!(matches!(
            result,
            SourceResult::Error(AppError::Decrypt(DecryptError::BadKey))
        ));
    }

    #[tokio::test]
    async fn meta_failure_serves_cached_dataset() {
        let fetcher = live_fetcher();
        let source = dataset(fetcher.clone(), cipher());
        source.search(&candidate("ABC1234")).await;

        fetcher.set_route(META_FILE, vec![MockReply::Status(503)]);
        let result = source.search(&candidate("ABC1234")).await;
        assert_eq!(result.kind(), OutcomeKind::Matched);
    }

    #[tokio::test]
    async fn meta_failure_without_cache_is_error() {
        let fetcher = MockFetcher::new().route(META_FILE, MockReply::Status(503));
        let source = dataset(fetcher, cipher());
        assert_eq!(source.search(&candidate("ABC1234")).await.kind(), OutcomeKind::Failed);
    }

    #[tokio::test]
    async fn plaintext_pages() {
        let fetcher = MockFetcher::new()
            .route(META_FILE, MockReply::body(r#"{"rotation": 1, "numPages": 1, "updated": "u"}"#))
            .route("Plates_r1_p1.json", MockReply::body(PAGE_ONE));
        let source = dataset(fetcher, PageReader::Plaintext);
        assert_eq!(source.search(&candidate("ABC1234")).await.kind(), OutcomeKind::Matched);
    }

    #[tokio::test]
    async fn zero_pages_is_empty_dataset() {
        let fetcher = MockFetcher::new()
            .route(META_FILE, MockReply::body(r#"{"rotation": 1, "numPages": 0, "updated": "u"}"#));
        let source = dataset(fetcher, PageReader::Plaintext);
        assert_eq!(source.search(&candidate("ABC1234")).await.kind(), OutcomeKind::NotMatched);
    }
}
