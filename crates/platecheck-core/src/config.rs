use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::error::AppError;
use crate::lookup::LookupConfig;

pub const DEFAULT_STOPICE_URL: &str = "https://www.stopice.net/platetracker/index.cgi";
pub const DEFAULT_DEFROST_DATA_URL: &str = "https://defrostmn.net/data/plates";

/// Whether an optional sub-source has what it needs to run.
///
/// Resolved once at startup; an unconfigured sub-source reports `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
    Configured(T),
    Unconfigured,
}

impl<T> Capability<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Capability::Configured(v),
            None => Capability::Unconfigured,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Capability::Configured(_))
    }

    pub fn as_ref(&self) -> Capability<&T> {
        match self {
            Capability::Configured(v) => Capability::Configured(v),
            Capability::Unconfigured => Capability::Unconfigured,
        }
    }

    pub fn configured(self) -> Option<T> {
        match self {
            Capability::Configured(v) => Some(v),
            Capability::Unconfigured => None,
        }
    }
}

/// A passphrase held in memory that is wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// How the paginated dataset's pages are to be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMode {
    Encrypted(Secret),
    Plaintext,
}

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub stopice_url: String,
    pub defrost_data_url: String,
    pub snapshot_url: Capability<String>,
    pub dataset_pages: Capability<PageMode>,
    pub cache_dir: Option<PathBuf>,
    pub request_timeout: Duration,
    pub source_timeout: Duration,
    pub retention: Duration,
    pub max_attempts: u32,
}

impl Settings {
    /// Read configuration from environment variables.
    ///
    /// - `STOPICE_URL`, `DEFROST_DATA_URL` (optional, public defaults)
    /// - `DEFROST_JSON_URL` (optional, enables the snapshot sub-source)
    /// - `DEFROST_DECRYPT_KEY` (optional, enables encrypted dataset pages)
    /// - `DEFROST_PLAINTEXT_PAGES` (optional bool, read pages unencrypted when no key is set)
    /// - `CACHE_DIR` (optional, enables disk persistence)
    /// - `PLATECHECK_REQUEST_TIMEOUT_SECS` (15), `PLATECHECK_SOURCE_TIMEOUT_SECS` (45),
    ///   `PLATECHECK_RETENTION_SECS` (3600), `PLATECHECK_MAX_ATTEMPTS` (3)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`Settings::from_env`] with an arbitrary variable source.
    /// Empty values count as unset.
    pub fn from_vars<F>(get: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let plaintext = match var("DEFROST_PLAINTEXT_PAGES") {
            None => false,
            Some(raw) => parse_bool("DEFROST_PLAINTEXT_PAGES", &raw)?,
        };
        let dataset_pages = match (var("DEFROST_DECRYPT_KEY"), plaintext) {
            (Some(key), _) => Capability::Configured(PageMode::Encrypted(Secret::new(key))),
            (None, true) => Capability::Configured(PageMode::Plaintext),
            (None, false) => Capability::Unconfigured,
        };

        Ok(Self {
            stopice_url: var("STOPICE_URL").unwrap_or_else(|| DEFAULT_STOPICE_URL.to_string()),
            defrost_data_url: var("DEFROST_DATA_URL")
                .unwrap_or_else(|| DEFAULT_DEFROST_DATA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            snapshot_url: Capability::from_option(var("DEFROST_JSON_URL")),
            dataset_pages,
            cache_dir: var("CACHE_DIR").map(PathBuf::from),
            request_timeout: Duration::from_secs(parse_positive(
                "PLATECHECK_REQUEST_TIMEOUT_SECS",
                var("PLATECHECK_REQUEST_TIMEOUT_SECS"),
                15,
            )?),
            source_timeout: Duration::from_secs(parse_positive(
                "PLATECHECK_SOURCE_TIMEOUT_SECS",
                var("PLATECHECK_SOURCE_TIMEOUT_SECS"),
                45,
            )?),
            retention: Duration::from_secs(parse_positive(
                "PLATECHECK_RETENTION_SECS",
                var("PLATECHECK_RETENTION_SECS"),
                3600,
            )?),
            max_attempts: parse_positive(
                "PLATECHECK_MAX_ATTEMPTS",
                var("PLATECHECK_MAX_ATTEMPTS"),
                3,
            )? as u32,
        })
    }

    pub fn lookup_config(&self) -> LookupConfig {
        LookupConfig {
            source_timeout: self.source_timeout,
            retention: self.retention,
        }
    }

    /// Neither of the tracker's sub-sources can run.
    pub fn tracker_unconfigured(&self) -> bool {
        !self.snapshot_url.is_configured() && !self.dataset_pages.is_configured()
    }
}

fn parse_positive(name: &str, raw: Option<String>, default: u64) -> Result<u64, AppError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let parsed: u64 = raw.parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {name} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 || parsed > u64::from(u32::MAX) {
        return Err(AppError::ConfigError(format!(
            "{name} must be between 1 and {}",
            u32::MAX
        )));
    }
    Ok(parsed)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, AppError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigError(format!(
            "Invalid {name} '{raw}': expected true or false"
        ))),
    }
}
