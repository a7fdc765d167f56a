//! Error taxonomy for the reflective-content pipeline.
//!
//! `ServiceError` describes one failed call to an external collaborator and
//! knows whether retrying it can help. `Error` is what the pipeline surfaces
//! to its callers. A quota denial is not an error; see `usage_gate`.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single call to an external service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// The caller's deadline passed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP client gave up on its own.
    #[error("request timed out: {0}")]
    TransportTimeout(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never reached a server (bad URL, origin policy).
    #[error("request blocked: {0}")]
    Blocked(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Client errors and blocked requests fail fast; everything else may
    /// succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Http { status, .. } => !(400..500).contains(status),
            ServiceError::Blocked(_) => false,
            ServiceError::Timeout(_)
            | ServiceError::TransportTimeout(_)
            | ServiceError::Network(_)
            | ServiceError::InvalidResponse(_) => true,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::TransportTimeout(e.to_string())
        } else if let Some(status) = e.status() {
            ServiceError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_builder() {
            ServiceError::Blocked(e.to_string())
        } else if e.is_decode() {
            ServiceError::InvalidResponse(e.to_string())
        } else {
            ServiceError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A durable write failed. Always surfaced to the user.
    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A later play or stop took over before this request finished.
    #[error("playback request was superseded")]
    Superseded,

    /// Local database (sled) failure.
    #[error("local store error: {0}")]
    Store(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Store(e.to_string())
    }
}
