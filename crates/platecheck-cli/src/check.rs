//! Live health check of every upstream source.
//!
//! Runs against the real sites with fresh in-memory caches, using a plate
//! the operator knows to be listed.

use std::fmt;

use anyhow::Result;

use platecheck_client::defrost::{DefrostSource, PageReader, PaginatedDataset};
use platecheck_client::service::{Caches, defrost_source, http_fetcher, stopice_source};
use platecheck_client::stopice::StopIceSource;
use platecheck_core::cache::CacheLayer;
use platecheck_core::config::Settings;
use platecheck_core::models::{PlateCandidate, SourceResult};
use platecheck_core::traits::{Fetcher, PlateSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass(String),
    Fail(String),
    Skip(String),
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass(msg) => write!(f, "PASS  {msg}"),
            CheckStatus::Fail(msg) => write!(f, "FAIL  {msg}"),
            CheckStatus::Skip(msg) => write!(f, "SKIP  {msg}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub label: &'static str,
    pub status: CheckStatus,
}

fn pass(msg: impl Into<String>) -> CheckStatus {
    CheckStatus::Pass(msg.into())
}

fn fail(msg: impl Into<String>) -> CheckStatus {
    CheckStatus::Fail(msg.into())
}

fn skip(msg: impl Into<String>) -> CheckStatus {
    CheckStatus::Skip(msg.into())
}

pub struct Checker<F: Fetcher> {
    stopice: StopIceSource<F>,
    defrost: DefrostSource<F>,
    /// Reads metadata even when pages cannot be decrypted.
    meta_probe: PaginatedDataset<F>,
    tracker_unconfigured: bool,
}

impl<F: Fetcher> Checker<F> {
    pub fn new(settings: &Settings, fetcher: F) -> Self {
        Self {
            stopice: stopice_source(settings, fetcher.clone()),
            defrost: defrost_source(settings, fetcher.clone(), &Caches::in_memory()),
            meta_probe: PaginatedDataset::new(
                fetcher,
                settings.defrost_data_url.as_str(),
                PageReader::Plaintext,
                CacheLayer::in_memory("meta-probe"),
            ),
            tracker_unconfigured: settings.tracker_unconfigured(),
        }
    }

    pub async fn run_all(&self, candidate: &PlateCandidate) -> Vec<CheckOutcome> {
        vec![
            CheckOutcome {
                label: "stopice.net search",
                status: self.search(candidate).await,
            },
            CheckOutcome {
                label: "stopice.net detail page",
                status: self.detail(candidate).await,
            },
            CheckOutcome {
                label: "defrostmn.net metadata",
                status: self.meta().await,
            },
            CheckOutcome {
                label: "defrostmn.net page decryption",
                status: self.pages().await,
            },
            CheckOutcome {
                label: "defrostmn.net snapshot JSON",
                status: self.snapshot().await,
            },
            CheckOutcome {
                label: "defrostmn.net full lookup",
                status: self.full_lookup(candidate).await,
            },
        ]
    }

    async fn search(&self, candidate: &PlateCandidate) -> CheckStatus {
        match self.stopice.try_search(candidate.as_str()).await {
            Ok(Some(record)) => pass(format!(
                "{} sighting(s) for {candidate}",
                record.sightings.len()
            )),
            Ok(None) => fail(format!("{candidate} not found; is it still listed?")),
            Err(e) => fail(format!("Error: {e}")),
        }
    }

    async fn detail(&self, candidate: &PlateCandidate) -> CheckStatus {
        let record = match self.stopice.try_detail(candidate.as_str()).await {
            Ok(record) => record,
            Err(e) => return fail(format!("Error: {e}")),
        };
        if record.sightings.is_empty() {
            return fail("No sightings parsed from the detail page");
        }
        if let Some(i) = record
            .sightings
            .values()
            .position(|s| s.date.is_empty() || s.location.is_empty())
        {
            return fail(format!("Sighting {} is missing a date or location", i + 1));
        }
        if !record
            .sightings
            .values()
            .any(|s| s.vehicle.is_some() || s.description.is_some())
        {
            return fail("No sighting has a vehicle or description");
        }
        pass(format!(
            "{} sighting(s) with vehicle/description data",
            record.sightings.len()
        ))
    }

    async fn meta(&self) -> CheckStatus {
        let meta = match self.meta_probe.fetch_meta().await {
            Ok(meta) => meta,
            Err(e) => return fail(format!("Error: {e}")),
        };
        if meta.page_count() == 0 {
            return fail("numPages is 0");
        }
        if meta.updated.is_empty() {
            return fail("updated is empty");
        }
        pass(format!(
            "rotation={}, numPages={}, updated={}",
            meta.rotation,
            meta.page_count(),
            meta.updated
        ))
    }

    async fn pages(&self) -> CheckStatus {
        let Some(dataset) = self.defrost.dataset() else {
            return skip("DEFROST_DECRYPT_KEY not set");
        };
        let meta = match dataset.fetch_meta().await {
            Ok(meta) => meta,
            Err(e) => return fail(format!("Metadata fetch failed: {e}")),
        };
        let records = match dataset.fetch_all(&meta).await {
            Ok(records) => records,
            Err(e) => return fail(format!("Error: {e}")),
        };
        if records.is_empty() {
            return fail("No records after reading every page");
        }
        if let Some(i) = records.iter().take(5).position(|r| r.fields.plate.is_empty()) {
            return fail(format!("Record {i} has no Plate field"));
        }
        pass(format!(
            "{} record(s) from {} page(s)",
            records.len(),
            meta.page_count()
        ))
    }

    async fn snapshot(&self) -> CheckStatus {
        let Some(snapshot) = self.defrost.snapshot() else {
            return skip("DEFROST_JSON_URL not set");
        };
        match snapshot.fetch_document().await {
            Ok(plates) if plates.is_empty() => fail("plates list is empty"),
            Ok(plates) => match plates.iter().take(5).position(|p| p.license_plate.is_empty()) {
                Some(i) => fail(format!("Entry {i} has no license_plate")),
                None => pass(format!("{} plate(s) in snapshot", plates.len())),
            },
            Err(e) => fail(format!("Error: {e}")),
        }
    }

    async fn full_lookup(&self, candidate: &PlateCandidate) -> CheckStatus {
        if self.tracker_unconfigured {
            return skip("Neither DEFROST_DECRYPT_KEY nor DEFROST_JSON_URL set");
        }
        match self.defrost.search(candidate).await {
            SourceResult::Match(record) => pass(format!(
                "Found: {} sighting(s) from {} dataset(s)",
                record.sightings.len(),
                record.origins().len()
            )),
            SourceResult::NoMatch => pass(format!("{candidate} not listed (not an error)")),
            SourceResult::Skipped => skip("No sub-source configured"),
            SourceResult::Error(e) => fail(format!("Error: {e}")),
        }
    }
}

/// Exit status when no plate was given.
pub const EXIT_USAGE: u8 = 2;

/// Print every outcome and a tally. Returns the exit status: 0 when nothing
/// failed, 1 otherwise.
pub fn print_report(outcomes: &[CheckOutcome]) -> u8 {
    let mut failed = 0;
    let mut passed = 0;
    let mut skipped = 0;
    for outcome in outcomes {
        println!("{:<32} {}", outcome.label, outcome.status);
        match outcome.status {
            CheckStatus::Pass(_) => passed += 1,
            CheckStatus::Fail(_) => failed += 1,
            CheckStatus::Skip(_) => skipped += 1,
        }
    }
    println!();
    println!("{passed} passed, {failed} failed, {skipped} skipped");
    u8::from(failed > 0)
}

pub async fn run(settings: &Settings, plate: Option<String>) -> Result<u8> {
    let Some(plate) = plate.filter(|p| !p.trim().is_empty()) else {
        eprintln!("Error: no plate provided.");
        eprintln!("Usage: platecheck check PLATE  or  CHECK_PLATE=PLATE platecheck check");
        return Ok(EXIT_USAGE);
    };
    let candidate = match PlateCandidate::typed(&plate) {
        Ok(candidate) => candidate,
        Err(e) => {
            eprintln!("Error: invalid plate {plate:?}: {e}");
            return Ok(EXIT_USAGE);
        }
    };

    println!("Checking live sources with plate {candidate}\n");
    let checker = Checker::new(settings, http_fetcher(settings)?);
    let outcomes = checker.run_all(&candidate).await;
    Ok(print_report(&outcomes))
}
