//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::models::{PlateCandidate, PlateRecord, SourceResult};
use crate::request::HttpRequest;
use crate::traits::{Fetcher, PlateSource};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// A canned upstream reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Body(String),
    Status(u16),
    Timeout,
    Network,
    /// Body delivered after a delay.
    Delayed(Duration, String),
}

impl MockReply {
    pub fn body(s: impl Into<String>) -> Self {
        MockReply::Body(s.into())
    }

    pub fn json(value: &serde_json::Value) -> Self {
        MockReply::Body(value.to_string())
    }
}

struct Route {
    fragment: String,
    replies: VecDeque<MockReply>,
}

/// Mock fetcher that answers by URL.
///
/// A request is matched against `"METHOD url"` and the longest registered
/// fragment contained in it wins. Each route replays its queue in order and
/// then keeps repeating the last reply. Unrouted requests get a 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<Vec<Route>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, fragment: &str, reply: MockReply) -> Self {
        self.set_route(fragment, vec![reply]);
        self
    }

    pub fn route_sequence(self, fragment: &str, replies: Vec<MockReply>) -> Self {
        self.set_route(fragment, replies);
        self
    }

    /// Replace (or add) a route on a fetcher that is already in use.
    pub fn set_route(&self, fragment: &str, replies: Vec<MockReply>) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|r| r.fragment != fragment);
        routes.push(Route {
            fragment: fragment.to_string(),
            replies: replies.into(),
        });
    }

    /// Every request seen so far, as `"METHOD url"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, fragment: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(fragment))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_reply(&self, key: &str) -> MockReply {
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes
            .iter_mut()
            .filter(|r| key.contains(&r.fragment))
            .max_by_key(|r| r.fragment.len())
        else {
            return MockReply::Status(404);
        };
        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap()
        } else {
            route
                .replies
                .front()
                .cloned()
                .unwrap_or(MockReply::Status(404))
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<String, AppError> {
        let key = request.to_string();
        self.calls.lock().unwrap().push(key.clone());
        match self.next_reply(&key) {
            MockReply::Body(body) => Ok(body),
            MockReply::Status(status) => Err(AppError::HttpStatus { status }),
            MockReply::Timeout => Err(AppError::Timeout(15)),
            MockReply::Network => Err(AppError::NetworkError("connection reset".into())),
            MockReply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(body)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Mock plate source with queued search and detail results.
///
/// An empty search queue answers `NoMatch`; an empty detail queue answers
/// `NotListed`.
#[derive(Clone)]
pub struct MockSource {
    name: &'static str,
    delay: Option<Duration>,
    searches: Arc<Mutex<VecDeque<SourceResult>>>,
    details: Arc<Mutex<VecDeque<Result<PlateRecord, AppError>>>>,
    search_calls: Arc<Mutex<Vec<String>>>,
    detail_calls: Arc<Mutex<Vec<String>>>,
}

impl MockSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            delay: None,
            searches: Arc::default(),
            details: Arc::default(),
            search_calls: Arc::default(),
            detail_calls: Arc::default(),
        }
    }

    pub fn with_search(self, result: SourceResult) -> Self {
        self.searches.lock().unwrap().push_back(result);
        self
    }

    pub fn with_detail(self, result: Result<PlateRecord, AppError>) -> Self {
        self.details.lock().unwrap().push_back(result);
        self
    }

    /// Delay every search by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.lock().unwrap().len()
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.lock().unwrap().len()
    }
}

impl PlateSource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, candidate: &PlateCandidate) -> SourceResult {
        self.search_calls
            .lock()
            .unwrap()
            .push(candidate.as_str().to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.searches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SourceResult::NoMatch)
    }

    async fn fetch_detail(&self, record: &PlateRecord) -> Result<PlateRecord, AppError> {
        self.detail_calls.lock().unwrap().push(record.plate.clone());
        self.details
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::NotListed(record.plate.clone())))
    }
}
