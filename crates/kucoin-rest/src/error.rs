//! Error types for REST API operations

use kucoin_auth::AuthError;
use kucoin_types::{ApiFailure, FeedError};

/// Errors that can occur during REST API operations
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing API credentials for a signed endpoint
    #[error("Authentication required for this endpoint")]
    AuthRequired,

    /// Request could not be signed
    #[error("Signing failed: {0}")]
    Signing(#[from] AuthError),

    /// API returned a non-success code
    #[error("API error {code}: {msg}")]
    Api { code: String, msg: String },

    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl RestError {
    /// Whether the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. } | Self::Parse(_))
    }
}

impl From<ApiFailure> for RestError {
    fn from(failure: ApiFailure) -> Self {
        Self::Api {
            code: failure.code,
            msg: failure.msg,
        }
    }
}

impl From<RestError> for FeedError {
    fn from(err: RestError) -> Self {
        if err.is_retryable() {
            FeedError::rest_call(crate::endpoints::market::FULL_DEPTH_PATH, err)
        } else {
            FeedError::Configuration(err.to_string())
        }
    }
}

/// Result type for REST operations
pub type RestResult<T> = Result<T, RestError>;
