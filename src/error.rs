//! Error types for the icon cache
//!
//! `CacheError` is what callers of the manager see. Every variant carries a
//! stable string code so a host runtime can reject a pending call with
//! `(code, message)` without inspecting the Rust type. `FetchError` describes
//! the failure of a single icon fetch and is collected, not thrown, by
//! `prefetch_icons` unless the fatal failure policy is configured.

use serde::Serialize;
use thiserror::Error;

use crate::icon::IconName;

/// Errors surfaced by the icon cache manager
#[derive(Debug, Error)]
pub enum CacheError {
    /// The identifier is empty or malformed; rejected before any fetch is dispatched
    #[error("Invalid icon identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    /// The configured capacity bound cannot hold anything
    #[error("Cache capacity must be a positive number of bytes, got {0}")]
    CapacityMisconfigured(u64),

    /// At least one icon failed to fetch and the fatal failure policy is active
    #[error("Failed to prefetch {} icon(s): {}", failures.len(), describe_failures(failures))]
    PrefetchFailed { failures: Vec<(IconName, FetchError)> },

    /// The persistence directory could not be prepared at startup
    #[error("Cache persistence error: {0}")]
    Persistence(String),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl CacheError {
    /// Stable error code for the reject path of an asynchronous call
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::InvalidIdentifier { .. } => "E_INVALID_ICON",
            CacheError::CapacityMisconfigured(_) => "E_CAPACITY",
            CacheError::PrefetchFailed { .. } => "E_PREFETCH_FAILED",
            CacheError::Persistence(_) => "E_PERSISTENCE",
            CacheError::Http(_) => "E_HTTP",
        }
    }

    /// Converts the error into the `(code, message)` shape used at the boundary
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

fn describe_failures(failures: &[(IconName, FetchError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{}: {}", name, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single icon fetch
///
/// Cloneable because one fetch result is delivered to every caller that
/// coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport-level failure (connection, timeout, body read)
    #[error("Request failed: {0}")]
    Request(String),

    /// The icon source does not know this identifier
    #[error("Icon not found")]
    NotFound,

    /// The icon source answered with a non-success status
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// The identifier cannot be resolved by this fetcher
    #[error("Unsupported identifier: {0}")]
    Unsupported(String),

    /// The asset alone is larger than the whole cache
    #[error("Icon is {size} bytes, larger than the {capacity} byte cache")]
    TooLarge { size: u64, capacity: u64 },

    /// The cache was cleared while the fetch was in flight
    #[error("Fetch cancelled by cache clear")]
    Cancelled,

    /// The fetch task ended without a result (the fetcher panicked or the
    /// runtime shut down)
    #[error("Fetch aborted before completing")]
    Aborted,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Request(err.to_string())
    }
}

/// Rejection payload crossing the runtime boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
}
