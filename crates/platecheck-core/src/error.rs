use std::sync::Arc;

use thiserror::Error;

/// Application-wide error types for platecheck.
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream answered with a non-success status code.
    #[error("HTTP {status} from upstream")]
    HttpStatus { status: u16 },

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error (refused, reset, DNS, truncated body).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The request could not be built (bad URL, bad query).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream answered, but not with the structure we know how to read.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A dataset page could not be decrypted.
    #[error("Decryption failed: {0}")]
    Decrypt(#[from] DecryptError),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A previously matched plate is no longer present upstream.
    #[error("Plate {0} is no longer listed")]
    NotListed(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Disk cache could not be read or written.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Several independent sub-queries failed.
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<AppError>),
}

/// Why a dataset page failed to decrypt.
///
/// Display output never contains key material or the passphrase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    /// Authentication tag mismatch: wrong passphrase, or the ciphertext was tampered with.
    #[error("authentication failed (wrong key or tampered page)")]
    BadKey,

    /// The envelope or the plaintext is structurally broken.
    #[error("corrupt page: {0}")]
    Corrupt(String),
}

/// Coarse classification used by the retry layer and for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying within the attempt budget.
    Transient,
    /// Retrying cannot help; surfaced as a source-level error.
    Permanent,
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpStatus { status } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_retryable() {
            ErrorClass::Transient
        } else {
            ErrorClass::Permanent
        }
    }

    /// Short, user-facing cause suitable for a one-line summary.
    pub fn brief(&self) -> String {
        match self {
            AppError::HttpStatus { status } if *status >= 500 => {
                "Could not reach lookup service".to_string()
            }
            AppError::HttpStatus { .. } => "Lookup service unavailable".to_string(),
            AppError::Timeout(_) | AppError::NetworkError(_) => {
                "Could not reach lookup service".to_string()
            }
            AppError::MalformedResponse(_) | AppError::SerializationError(_) => {
                "Unexpected response from lookup service".to_string()
            }
            AppError::Decrypt(_) => "Could not decrypt dataset".to_string(),
            AppError::Aggregate(errors) => errors
                .iter()
                .map(AppError::brief)
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }
}

impl AppError {
    /// Owned error from one shared between callers of a coalesced fetch.
    ///
    /// Serialization errors cannot be copied and come back as
    /// [`AppError::MalformedResponse`] with the same message.
    pub fn from_shared(shared: Arc<AppError>) -> AppError {
        Arc::try_unwrap(shared).unwrap_or_else(|shared| shared.duplicate())
    }

    fn duplicate(&self) -> AppError {
        match self {
            AppError::HttpStatus { status } => AppError::HttpStatus { status: *status },
            AppError::Timeout(secs) => AppError::Timeout(*secs),
            AppError::NetworkError(msg) => AppError::NetworkError(msg.clone()),
            AppError::InvalidRequest(msg) => AppError::InvalidRequest(msg.clone()),
            AppError::MalformedResponse(msg) => AppError::MalformedResponse(msg.clone()),
            AppError::Decrypt(e) => AppError::Decrypt(e.clone()),
            AppError::SerializationError(e) => AppError::MalformedResponse(e.to_string()),
            AppError::NotListed(plate) => AppError::NotListed(plate.clone()),
            AppError::ConfigError(msg) => AppError::ConfigError(msg.clone()),
            AppError::CacheError(msg) => AppError::CacheError(msg.clone()),
            AppError::Aggregate(errors) => {
                AppError::Aggregate(errors.iter().map(AppError::duplicate).collect())
            }
        }
    }
}

fn join_errors(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
