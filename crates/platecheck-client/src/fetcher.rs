use std::time::Duration;

use platecheck_core::error::AppError;
use platecheck_core::request::{HttpRequest, Method};
use platecheck_core::traits::Fetcher;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

/// Generic user agent sent with every request. Upstream sites must not be
/// able to tell which tool is asking.
pub const USER_AGENT: &str = "Mozilla/5.0 (compatible)";

/// HTTP fetcher using reqwest.
///
/// One attempt per call, bounded by the client timeout. Wrap it in a
/// [`RetryingFetcher`](platecheck_core::retry::RetryingFetcher) for retries.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(15))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else if e.is_builder() {
            AppError::InvalidRequest(e.to_string())
        } else {
            AppError::NetworkError(e.to_string())
        }
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<String, AppError> {
        let url = request.full_url()?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::InvalidRequest(format!(
                    "URL scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }

        let builder = match request.method {
            Method::Get => self.client.get(url.as_str()),
            Method::Post => self
                .client
                .post(url.as_str())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.form_body().unwrap_or_default()),
        };

        tracing::debug!(%request, "Sending request");
        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%request, status = status.as_u16(), "Upstream returned error status");
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else {
                AppError::NetworkError(format!("Failed to read response body: {e}"))
            }
        })
    }
}
