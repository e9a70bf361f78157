//! Public plate search site ("stopice").
//!
//! A search is a form POST that returns a summary page; the full record for
//! a matched plate lives on a separate detail page fetched only on expand.

pub mod detail;
pub mod search;

use platecheck_core::error::AppError;
use platecheck_core::models::{DetailRef, PlateCandidate, PlateRecord, SourceResult};
use platecheck_core::request::HttpRequest;
use platecheck_core::traits::{Fetcher, PageParser, PlateSource};

pub use detail::DetailPageParser;
pub use search::SearchPageParser;

pub const SOURCE_NAME: &str = "stopice.net";

/// Adapter for the search site, generic over fetcher and both page parsers.
#[derive(Clone)]
pub struct StopIceSource<F, S = SearchPageParser, D = DetailPageParser>
where
    F: Fetcher,
    S: PageParser,
    D: PageParser,
{
    fetcher: F,
    base_url: String,
    search_parser: S,
    detail_parser: D,
}

impl<F: Fetcher> StopIceSource<F> {
    pub fn new(fetcher: F, base_url: impl Into<String>) -> Self {
        Self::with_parsers(fetcher, base_url, SearchPageParser, DetailPageParser)
    }
}

impl<F, S, D> StopIceSource<F, S, D>
where
    F: Fetcher,
    S: PageParser,
    D: PageParser,
{
    pub fn with_parsers(
        fetcher: F,
        base_url: impl Into<String>,
        search_parser: S,
        detail_parser: D,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            search_parser,
            detail_parser,
        }
    }

    pub fn search_request(&self, plate: &str) -> HttpRequest {
        HttpRequest::post_form(&self.base_url, [("search", "1"), ("keywords", plate)])
    }

    pub fn detail_request(&self, plate: &str) -> HttpRequest {
        HttpRequest::get(&self.base_url).with_query("plate", plate)
    }

    /// Public link to a plate's detail page.
    pub fn detail_url(&self, plate: &str) -> String {
        self.detail_request(plate)
            .full_url()
            .map(String::from)
            .unwrap_or_else(|_| format!("{}?plate={plate}", self.base_url))
    }

    /// Search and return the raw parse result, without folding errors into
    /// a [`SourceResult`].
    pub async fn try_search(&self, plate: &str) -> Result<Option<PlateRecord>, AppError> {
        let html = self.fetcher.fetch(&self.search_request(plate)).await?;
        let mut record = self.search_parser.parse(plate, &html)?.into_iter().next();
        if let Some(record) = record.as_mut() {
            record.detail = Some(DetailRef {
                url: self.detail_url(plate),
            });
        }
        Ok(record)
    }

    /// Fetch and parse the detail page for a plate.
    pub async fn try_detail(&self, plate: &str) -> Result<PlateRecord, AppError> {
        let html = self.fetcher.fetch(&self.detail_request(plate)).await?;
        let mut record = self
            .detail_parser
            .parse(plate, &html)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotListed(plate.to_string()))?;
        record.detail = Some(DetailRef {
            url: self.detail_url(plate),
        });
        Ok(record)
    }
}

impl<F, S, D> PlateSource for StopIceSource<F, S, D>
where
    F: Fetcher,
    S: PageParser,
    D: PageParser,
{
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn search(&self, candidate: &PlateCandidate) -> SourceResult {
        match self.try_search(candidate.as_str()).await {
            Ok(Some(record)) => SourceResult::Match(record),
            Ok(None) => SourceResult::NoMatch,
            Err(e) => {
                tracing::warn!(
                    source = SOURCE_NAME,
                    plate = %candidate,
                    error = %e,
                    "Search failed"
                );
                SourceResult::Error(e)
            }
        }
    }

    /// Detail page record, keeping the report count seen on the search page.
    async fn fetch_detail(&self, record: &PlateRecord) -> Result<PlateRecord, AppError> {
        let mut detail = self.try_detail(&record.plate).await?;
        detail.report_count = detail.report_count.merge(record.report_count.clone());
        detail.status = detail.status.merge(record.status.clone());
        Ok(detail)
    }
}
