//! Error types for authentication operations

use kucoin_types::FeedError;

/// Errors that can occur during authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid API credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// API returned a non-success code
    #[error("API error {code}: {msg}")]
    Api { code: String, msg: String },

    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Environment variable not set
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    /// Token response listed no websocket server
    #[error("Token response contains no instance server")]
    NoInstanceServer,
}

impl AuthError {
    /// Whether a later attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. } | Self::Parse(_) | Self::NoInstanceServer)
    }
}

impl From<AuthError> for FeedError {
    fn from(err: AuthError) -> Self {
        if err.is_retryable() {
            FeedError::rest_call(crate::token::BULLET_PUBLIC_PATH, err)
        } else {
            FeedError::Configuration(err.to_string())
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
