//! Error types for kwcluster.

use thiserror::Error;

/// Result type alias using kwcluster's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for kwcluster operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Research job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Intent classification failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Shared rate-limit store failed
    #[error("Rate limiter error: {0}")]
    RateLimiter(String),

    /// Pipeline/job lifecycle error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::InvalidInput(format!("Unreadable tabular input: {}", e))
    }
}

/// Failure modes of a single SERP request.
///
/// These never fail a job: the fetcher folds them into a [`crate::FetchOutcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerpError {
    /// Provider answered HTTP 429.
    #[error("SERP provider rate limited the request")]
    RateLimited,

    /// Provider answered with another non-success status.
    #[error("SERP provider returned status {0}")]
    Status(u16),

    /// Connection, timeout, or transport failure.
    #[error("SERP network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("SERP decode error: {0}")]
    Decode(String),
}

impl SerpError {
    /// Whether the provider signalled throttling (retried with exponential backoff).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SerpError::RateLimited)
    }
}
