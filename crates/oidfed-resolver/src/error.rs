//! Error types for trust chain resolution

use oidfed_core::FederationError;
use thiserror::Error;

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors that can occur while fetching statements or walking authority hints
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The statement could not be parsed, verified or validated
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// No statement is known for the requested entity
    #[error("Statement not found: {0}")]
    NotFound(String),

    /// A fetched statement does not describe what was asked for
    #[error("Unexpected statement: {0}")]
    UnexpectedStatement(String),

    /// An authority does not publish a fetch endpoint
    #[error("Authority {0} publishes no federation_fetch_endpoint")]
    MissingFetchEndpoint(String),

    /// The fetch did not complete in time
    #[error("Fetch timed out: {0}")]
    Timeout(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        ResolveError::HttpError(err.to_string())
    }
}

impl From<url::ParseError> for ResolveError {
    fn from(err: url::ParseError) -> Self {
        ResolveError::InvalidUrl(err.to_string())
    }
}
