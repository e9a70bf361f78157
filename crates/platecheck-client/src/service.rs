//! Wiring: settings in, ready-to-use lookup service out.

use platecheck_core::cache::{CacheLayer, DiskStore};
use platecheck_core::config::{Capability, Settings};
use platecheck_core::error::AppError;
use platecheck_core::lookup::LookupService;
use platecheck_core::retry::{RetryPolicy, RetryingFetcher};
use platecheck_core::traits::Fetcher;

use crate::defrost::paginated::DatasetRecord;
use crate::defrost::snapshot::SnapshotPlate;
use crate::defrost::{DefrostSource, PageReader, PaginatedDataset, SnapshotSource};
use crate::fetcher::ReqwestFetcher;
use crate::stopice::StopIceSource;

pub type HttpFetcher = RetryingFetcher<ReqwestFetcher>;
pub type DefaultLookup = LookupService<StopIceSource<HttpFetcher>, DefrostSource<HttpFetcher>>;

/// Dataset caches shared by every lookup in the process.
#[derive(Clone)]
pub struct Caches {
    pub pages: CacheLayer<Vec<DatasetRecord>>,
    pub snapshot: CacheLayer<Vec<SnapshotPlate>>,
}

impl Caches {
    pub fn in_memory() -> Self {
        Self {
            pages: CacheLayer::in_memory("defrost-pages"),
            snapshot: CacheLayer::in_memory("defrost-snapshot"),
        }
    }

    /// Disk-backed under `CACHE_DIR` when set, loaded eagerly.
    pub async fn from_settings(settings: &Settings) -> Self {
        let Some(dir) = &settings.cache_dir else {
            return Self::in_memory();
        };
        let caches = Self {
            pages: CacheLayer::with_disk("defrost-pages", DiskStore::new(dir.join("pages"))),
            snapshot: CacheLayer::with_disk(
                "defrost-snapshot",
                DiskStore::new(dir.join("snapshot")),
            ),
        };
        let loaded = caches.pages.warm().await + caches.snapshot.warm().await;
        tracing::info!(dir = %dir.display(), loaded, "Disk cache enabled");
        caches
    }
}

/// HTTP client with the configured timeout and retry budget.
pub fn http_fetcher(settings: &Settings) -> Result<HttpFetcher, AppError> {
    let inner = ReqwestFetcher::with_timeout(settings.request_timeout)?;
    Ok(RetryingFetcher::new(
        inner,
        RetryPolicy::new(settings.max_attempts),
    ))
}

pub fn stopice_source<F: Fetcher>(settings: &Settings, fetcher: F) -> StopIceSource<F> {
    StopIceSource::new(fetcher, settings.stopice_url.as_str())
}

pub fn defrost_source<F: Fetcher>(
    settings: &Settings,
    fetcher: F,
    caches: &Caches,
) -> DefrostSource<F> {
    let dataset = match settings.dataset_pages.as_ref() {
        Capability::Configured(mode) => Capability::Configured(PaginatedDataset::new(
            fetcher.clone(),
            settings.defrost_data_url.as_str(),
            PageReader::from_mode(mode),
            caches.pages.clone(),
        )),
        Capability::Unconfigured => Capability::Unconfigured,
    };
    let snapshot = match settings.snapshot_url.as_ref() {
        Capability::Configured(url) => Capability::Configured(SnapshotSource::new(
            fetcher,
            url.as_str(),
            caches.snapshot.clone(),
        )),
        Capability::Unconfigured => Capability::Unconfigured,
    };
    DefrostSource::new(dataset, snapshot)
}

/// Build the lookup service for the given settings.
pub async fn build_lookup(settings: &Settings) -> Result<DefaultLookup, AppError> {
    build_lookup_with(settings, &Caches::from_settings(settings).await)
}

pub fn build_lookup_with(settings: &Settings, caches: &Caches) -> Result<DefaultLookup, AppError> {
    if settings.tracker_unconfigured() {
        tracing::warn!(
            "Neither DEFROST_DECRYPT_KEY/DEFROST_PLAINTEXT_PAGES nor DEFROST_JSON_URL is set; \
             defrostmn.net will be skipped"
        );
    }
    let fetcher = http_fetcher(settings)?;
    Ok(LookupService::new(
        stopice_source(settings, fetcher.clone()),
        defrost_source(settings, fetcher, caches),
        settings.lookup_config(),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use platecheck_core::traits::PlateSource;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_vars(|name| vars.get(name).cloned()).unwrap()
    }

    #[tokio::test]
    async fn builds_with_defaults() {
        let lookup = build_lookup(&settings(&[])).await.unwrap();
        assert_eq!(lookup.first().name(), "stopice.net");
        assert_eq!(lookup.second().name(), "defrostmn.net");
        assert!(lookup.second().dataset().is_none());
        assert!(lookup.second().snapshot().is_none());
    }

    #[tokio::test]
    async fn configured_sub_sources_are_built() {
        let settings = settings(&[
            ("DEFROST_DECRYPT_KEY", "secret"),
            ("DEFROST_JSON_URL", "https://defrost.test/stopice.json"),
        ]);
        let lookup = build_lookup(&settings).await.unwrap();
        let defrost = lookup.second();
        assert!(defrost.dataset().is_some());
        assert_eq!(defrost.snapshot().unwrap().url(), "https://defrost.test/stopice.json");
    }

    #[tokio::test]
    async fn disk_caches_live_under_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&[("CACHE_DIR", dir.path().to_str().unwrap())]);
        let caches = Caches::from_settings(&settings).await;
        assert_eq!(caches.pages.name(), "defrost-pages");
        assert_eq!(caches.pages.warm().await, 0);
    }
}
