use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::AppError;

/// Longest plate we are willing to send upstream.
pub const MAX_PLATE_LEN: usize = 10;

/// Where a plate candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    Typed,
    Ocr,
    Speech,
}

/// Why a raw string was rejected as a plate candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CandidateError {
    #[error("no plate given")]
    Empty,

    #[error("plate is {len} characters long, at most {max} allowed")]
    TooLong { len: usize, max: usize },

    #[error("invalid character {0:?}: use letters, numbers, spaces, or hyphens")]
    InvalidCharacter(char),
}

/// A normalized string hypothesized to be a license plate.
///
/// Always non-empty, at most [`MAX_PLATE_LEN`] characters, and made only of
/// `A-Z` and `0-9`, so it is safe to place in a query string or form body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlateCandidate {
    plate: String,
    origin: CandidateOrigin,
}

impl PlateCandidate {
    /// Normalize and validate raw input.
    ///
    /// Spaces, hyphens and dots are dropped and letters upper-cased; any
    /// other non-alphanumeric character rejects the candidate.
    pub fn new(raw: &str, origin: CandidateOrigin) -> Result<Self, CandidateError> {
        let mut plate = String::with_capacity(raw.len());
        for c in raw.chars() {
            if c.is_whitespace() || matches!(c, '-' | '.') {
                continue;
            }
            if !c.is_ascii_alphanumeric() {
                return Err(CandidateError::InvalidCharacter(c));
            }
            plate.push(c.to_ascii_uppercase());
        }

        if plate.is_empty() {
            return Err(CandidateError::Empty);
        }
        if plate.len() > MAX_PLATE_LEN {
            return Err(CandidateError::TooLong {
                len: plate.len(),
                max: MAX_PLATE_LEN,
            });
        }

        Ok(Self { plate, origin })
    }

    pub fn typed(raw: &str) -> Result<Self, CandidateError> {
        Self::new(raw, CandidateOrigin::Typed)
    }

    pub fn as_str(&self) -> &str {
        &self.plate
    }

    pub fn origin(&self) -> CandidateOrigin {
        self.origin
    }

    /// True if an upstream plate string denotes the same plate.
    pub fn matches(&self, upstream: &str) -> bool {
        normalize_plate(upstream) == self.plate
    }
}

impl fmt::Display for PlateCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plate)
    }
}

/// Lenient normalization for plates found in upstream data.
///
/// Unlike [`PlateCandidate::new`] this never fails: it keeps only ASCII
/// alphanumerics, upper-cased.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Which upstream document a value was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    SearchPage,
    DetailPage,
    PaginatedDataset,
    Snapshot,
}

impl Provenance {
    pub fn label(&self) -> &'static str {
        match self {
            Provenance::SearchPage => "search",
            Provenance::DetailPage => "detail",
            Provenance::PaginatedDataset => "dataset",
            Provenance::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A value together with every provenance that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributed<T> {
    pub value: T,
    pub origins: BTreeSet<Provenance>,
}

impl<T> Attributed<T> {
    /// Reported by more than one independent document.
    pub fn is_corroborated(&self) -> bool {
        self.origins.len() > 1
    }

    pub fn origin_labels(&self) -> String {
        self.origins
            .iter()
            .map(Provenance::label)
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// All distinct values observed for one field, each tagged with its origins.
///
/// Kept sorted by value so that merging is order-independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observed<T>(Vec<Attributed<T>>);

impl<T> Default for Observed<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: Ord> Observed<T> {
    pub fn single(value: T, origin: Provenance) -> Self {
        let mut observed = Self::default();
        observed.insert(value, origin);
        observed
    }

    pub fn insert(&mut self, value: T, origin: Provenance) {
        match self.0.binary_search_by(|a| a.value.cmp(&value)) {
            Ok(i) => {
                self.0[i].origins.insert(origin);
            }
            Err(i) => self.0.insert(
                i,
                Attributed {
                    value,
                    origins: BTreeSet::from([origin]),
                },
            ),
        }
    }

    /// Union of both observations; equal values pool their origins.
    pub fn merge(mut self, other: Self) -> Self {
        for attributed in other.0 {
            match self.0.binary_search_by(|a| a.value.cmp(&attributed.value)) {
                Ok(i) => self.0[i].origins.extend(attributed.origins),
                Err(i) => self.0.insert(i, attributed),
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attributed<T>> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter().map(|a| &a.value)
    }

    /// More than one distinct value was reported.
    pub fn is_conflicting(&self) -> bool {
        self.0.len() > 1
    }

    /// Every provenance that contributed at least one value.
    pub fn origins(&self) -> BTreeSet<Provenance> {
        self.0
            .iter()
            .flat_map(|a| a.origins.iter().copied())
            .collect()
    }
}

/// A single report of the plate being seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    pub date: String,
    pub time: Option<String>,
    pub location: String,
    pub vehicle: Option<String>,
    pub description: Option<String>,
}

/// Sightings in the order upstream listed them.
///
/// Repeated reports are kept as separate entries. Origins are only pooled
/// when two records are merged and both independently list a sighting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sightings(Vec<Attributed<Sighting>>);

impl Sightings {
    pub fn push(&mut self, sighting: Sighting, origin: Provenance) {
        self.0.push(Attributed {
            value: sighting,
            origins: BTreeSet::from([origin]),
        });
    }

    /// Combine with the sightings of another record.
    ///
    /// The side with the lower-ranked origin is taken as the base. Entries of
    /// the other side equal to a base entry from different documents are
    /// pooled into it, the rest are appended. Entries are then grouped by
    /// their first origin, keeping page order within each group.
    pub fn merge(self, other: Self) -> Self {
        let (mut base, rest) = if other.first_origin() < self.first_origin() {
            (other, self)
        } else {
            (self, other)
        };
        for attributed in rest.0 {
            let shared = base.0.iter_mut().find(|a| {
                a.value == attributed.value && a.origins.is_disjoint(&attributed.origins)
            });
            match shared {
                Some(existing) => existing.origins.extend(attributed.origins),
                None => base.0.push(attributed),
            }
        }
        base.0.sort_by_key(|a| a.origins.first().copied());
        base
    }

    fn first_origin(&self) -> Option<Provenance> {
        self.0.iter().filter_map(|a| a.origins.first().copied()).min()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attributed<Sighting>> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Sighting> {
        self.0.iter().map(|a| &a.value)
    }

    pub fn origins(&self) -> BTreeSet<Provenance> {
        self.0
            .iter()
            .flat_map(|a| a.origins.iter().copied())
            .collect()
    }
}

/// Where the full record of a match can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetailRef {
    pub url: String,
}

/// Everything a source knows about one plate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateRecord {
    pub plate: String,
    pub status: Observed<String>,
    pub report_count: Observed<u32>,
    pub sightings: Sightings,
    pub detail: Option<DetailRef>,
}

impl PlateRecord {
    pub fn new(plate: impl Into<String>) -> Self {
        Self {
            plate: plate.into(),
            status: Observed::default(),
            report_count: Observed::default(),
            sightings: Sightings::default(),
            detail: None,
        }
    }

    /// Combine two records for the same plate without preferring either side.
    ///
    /// Commutative up to the order of sightings that share a first origin.
    pub fn merge(self, other: PlateRecord) -> PlateRecord {
        let detail = match (self.detail, other.detail) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        PlateRecord {
            plate: normalize_plate(&self.plate).min(normalize_plate(&other.plate)),
            status: self.status.merge(other.status),
            report_count: self.report_count.merge(other.report_count),
            sightings: self.sightings.merge(other.sightings),
            detail,
        }
    }

    /// Every provenance that contributed to this record.
    pub fn origins(&self) -> BTreeSet<Provenance> {
        let mut origins = self.status.origins();
        origins.extend(self.report_count.origins());
        origins.extend(self.sightings.origins());
        origins
    }
}

/// Outcome of querying one source (or sub-source) for one plate.
///
/// Exactly one variant per query: a source never reports partially.
#[derive(Debug)]
pub enum SourceResult {
    Match(PlateRecord),
    /// Upstream answered and has no record of the plate.
    NoMatch,
    /// Not configured, so not checked.
    Skipped,
    Error(AppError),
}

/// Discriminant of [`SourceResult`], handy for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Matched,
    NotMatched,
    Skipped,
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::Matched => "matched",
            OutcomeKind::NotMatched => "not matched",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed => "error",
        };
        f.write_str(s)
    }
}

impl SourceResult {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            SourceResult::Match(_) => OutcomeKind::Matched,
            SourceResult::NoMatch => OutcomeKind::NotMatched,
            SourceResult::Skipped => OutcomeKind::Skipped,
            SourceResult::Error(_) => OutcomeKind::Failed,
        }
    }

    pub fn record(&self) -> Option<&PlateRecord> {
        match self {
            SourceResult::Match(record) => Some(record),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            SourceResult::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
