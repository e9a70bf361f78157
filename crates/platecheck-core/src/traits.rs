use std::future::Future;

use crate::error::AppError;
use crate::models::{PlateCandidate, PlateRecord, SourceResult};
use crate::request::HttpRequest;

/// Performs a single HTTP exchange and returns the response body.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, request: &HttpRequest)
    -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Turns an irregular upstream page into plate records.
pub trait PageParser: Send + Sync + Clone {
    /// `plate` is the normalized plate the page was requested for.
    fn parse(&self, plate: &str, html: &str) -> Result<Vec<PlateRecord>, AppError>;
}

/// One independent upstream source the orchestrator can query.
pub trait PlateSource: Send + Sync {
    /// Stable display name used in summaries.
    fn name(&self) -> &'static str;

    /// Look the candidate up. Never fails as a whole: failures become
    /// [`SourceResult::Error`].
    fn search(&self, candidate: &PlateCandidate) -> impl Future<Output = SourceResult> + Send;

    /// Fetch the full record for a plate the search already matched.
    fn fetch_detail(
        &self,
        record: &PlateRecord,
    ) -> impl Future<Output = Result<PlateRecord, AppError>> + Send;
}
