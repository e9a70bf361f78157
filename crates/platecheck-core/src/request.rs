use std::fmt;

use url::{Url, form_urlencoded};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// An outbound request to an upstream source.
///
/// Either a GET with optional query pairs or a form-encoded POST. Bodies are
/// rendered here so the HTTP client needs no form/query support of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    pub fn post_form<K, V>(url: impl Into<String>, form: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            form: form.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Base URL with query pairs appended.
    pub fn full_url(&self) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| AppError::InvalidRequest(format!("{}: {e}", self.url)))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }

    /// `application/x-www-form-urlencoded` body, or `None` for a GET.
    pub fn form_body(&self) -> Option<String> {
        match self.method {
            Method::Get => None,
            Method::Post => Some(
                form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(self.form.iter())
                    .finish(),
            ),
        }
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self.method {
            Method::Get => "GET",
            Method::Post => "POST",
        };
        match self.full_url() {
            Ok(url) => write!(f, "{method} {url}"),
            Err(_) => write!(f, "{method} {}", self.url),
        }
    }
}
