pub mod cache;
pub mod candidate;
pub mod config;
pub mod error;
pub mod lookup;
pub mod models;
pub mod pending;
pub mod report;
pub mod request;
pub mod retry;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{AppError, DecryptError};
pub use lookup::{LookupService, Summary, TracingLookupReporter};
pub use models::{PlateCandidate, PlateRecord, SourceResult, compute_hash};
pub use traits::{Fetcher, PageParser, PlateSource};
