//! Legacy JSON snapshot of the search site's plates, republished by the tracker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use platecheck_core::cache::{CacheEntry, CacheLayer, Freshness};
use platecheck_core::error::AppError;
use platecheck_core::models::{
    PlateCandidate, PlateRecord, Provenance, Sighting, SourceResult, normalize_plate,
};
use platecheck_core::request::HttpRequest;
use platecheck_core::traits::Fetcher;
use serde::{Deserialize, Serialize};

use super::lenient;

pub const CACHE_KEY: &str = "defrost-snapshot";

/// How long a fetched snapshot may be served.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(3 * 60 * 60);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub month: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub day: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub year: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub datestamp: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub vehicle_make: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub comments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPlate {
    #[serde(default, deserialize_with = "lenient::string")]
    pub license_plate: String,
    #[serde(default)]
    pub records: Vec<SnapshotEntry>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    plates: Option<Vec<SnapshotPlate>>,
}

/// Parse the snapshot document. A document without a `plates` list is malformed.
pub fn parse_snapshot(body: &str) -> Result<Vec<SnapshotPlate>, AppError> {
    let document: SnapshotDocument = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedResponse(format!("invalid snapshot JSON: {e}")))?;
    document
        .plates
        .ok_or_else(|| AppError::MalformedResponse("snapshot has no plates list".into()))
}

impl SnapshotEntry {
    /// `MONTH DAY, YEAR` when all three parts exist, otherwise the datestamp.
    pub fn display_date(&self) -> String {
        if self.month.is_empty() || self.day.is_empty() || self.year.is_empty() {
            self.datestamp.clone()
        } else {
            format!("{} {}, {}", self.month, self.day, self.year)
        }
    }

    pub fn to_sighting(&self) -> Sighting {
        let date = self.display_date();
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Sighting {
            time: non_empty(&self.datestamp).filter(|stamp| *stamp != date),
            date,
            location: self.address.clone(),
            vehicle: non_empty(&self.vehicle_make),
            description: non_empty(&self.comments),
        }
    }
}

impl SnapshotPlate {
    pub fn to_record(&self) -> PlateRecord {
        let origin = Provenance::Snapshot;
        let mut record = PlateRecord::new(normalize_plate(&self.license_plate));
        let count = u32::try_from(self.records.len()).unwrap_or(u32::MAX);
        record.report_count.insert(count, origin);
        for entry in &self.records {
            record.sightings.push(entry.to_sighting(), origin);
        }
        record
    }
}

pub fn find_plate(plates: &[SnapshotPlate], candidate: &PlateCandidate) -> Option<PlateRecord> {
    plates
        .iter()
        .filter(|p| candidate.matches(&p.license_plate))
        .map(SnapshotPlate::to_record)
        .reduce(PlateRecord::merge)
}

/// Snapshot sub-source, cached for [`SNAPSHOT_TTL`].
#[derive(Clone)]
pub struct SnapshotSource<F: Fetcher> {
    fetcher: F,
    url: String,
    ttl: Duration,
    cache: CacheLayer<Vec<SnapshotPlate>>,
}

impl<F: Fetcher> SnapshotSource<F> {
    pub fn new(fetcher: F, url: impl Into<String>, cache: CacheLayer<Vec<SnapshotPlate>>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            ttl: SNAPSHOT_TTL,
            cache,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &CacheLayer<Vec<SnapshotPlate>> {
        &self.cache
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the document from upstream, bypassing the cache.
    pub async fn fetch_document(&self) -> Result<Vec<SnapshotPlate>, AppError> {
        let body = self.fetcher.fetch(&HttpRequest::get(self.url.as_str())).await?;
        parse_snapshot(&body)
    }

    pub async fn plates(&self) -> Result<Arc<CacheEntry<Vec<SnapshotPlate>>>, AppError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AppError::ConfigError(format!("snapshot TTL out of range: {e}")))?;
        self.cache
            .get_or_fetch(CACHE_KEY, now, None, move || async move {
                let plates = self.fetch_document().await?;
                tracing::info!(plates = plates.len(), "Fetched snapshot");
                Ok::<_, AppError>((plates, Freshness::expires_after(now, ttl)))
            })
            .await
    }

    pub async fn search(&self, candidate: &PlateCandidate) -> SourceResult {
        match self.plates().await {
            Ok(entry) => match find_plate(&entry.payload, candidate) {
                Some(record) => SourceResult::Match(record),
                None => SourceResult::NoMatch,
            },
            Err(e) => {
                tracing::warn!(plate = %candidate, error = %e, "Snapshot search failed");
                SourceResult::Error(e)
            }
        }
    }
}
