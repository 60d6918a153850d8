//! Error types for the book feed

use crate::{ParseFailure, Side};
use std::time::Duration;
use thiserror::Error;

/// Main error type for feed operations
#[derive(Error, Debug)]
pub enum FeedError {
    // === Connection Errors ===
    /// Failed to establish the websocket connection
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Connection attempt timed out
    #[error("Connection timeout after {timeout:?} to {url}")]
    ConnectionTimeout { url: String, timeout: Duration },

    /// Websocket transport failure after the connection was up
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server closed the connection
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Keep-alive ping could not be sent
    #[error("Ping failed: {0}")]
    PingFailed(String),

    // === Handshake Errors ===
    /// A handshake step did not complete in time
    #[error("Timed out after {timeout:?} waiting for {stage}")]
    HandshakeTimeout {
        stage: &'static str,
        timeout: Duration,
    },

    /// The venue rejected an openTunnel/subscribe request
    #[error("Request {id} rejected: {reason}")]
    SubscriptionRejected { id: String, reason: String },

    // === REST Errors ===
    /// REST call failed (transport error or non-success code)
    #[error("REST call to {endpoint} failed: {reason}")]
    RestCall { endpoint: String, reason: String },

    // === Protocol Errors ===
    /// A feed message could not be parsed
    #[error("Parse failure: {0}")]
    Parse(#[from] ParseFailure),

    // === Integrity Errors ===
    /// Live book differs from the REST reference at the same sequence
    #[error("Verification failure for {instrument} at sequence {sequence}: {side} differ")]
    VerificationFailure {
        instrument: String,
        sequence: u64,
        side: Side,
    },

    /// Live book moved past the reference sequence without matching it
    #[error("Sequence gap for {instrument}: live sequence {live} passed verification target {target}")]
    SequenceGap {
        instrument: String,
        target: u64,
        live: u64,
    },

    // === Local Errors ===
    /// Snapshot file could not be written or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Shutdown in progress
    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl FeedError {
    /// Returns true if the current connection must be torn down
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::Transport(_)
                | Self::ConnectionClosed
                | Self::PingFailed(_)
                | Self::HandshakeTimeout { .. }
                | Self::SubscriptionRejected { .. }
                | Self::VerificationFailure { .. }
                | Self::SequenceGap { .. }
        )
    }

    /// Returns true if the failed operation may be retried in place
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RestCall { .. }
                | Self::ConnectionFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::Transport(_)
        )
    }

    /// Returns true for book integrity failures (mismatch or gap)
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::VerificationFailure { .. } | Self::SequenceGap { .. }
        )
    }

    /// Returns true if no amount of restarting will help
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ShuttingDown)
    }

    /// Create a REST call error
    pub fn rest_call(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::RestCall {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using FeedError
pub type FeedResult<T> = Result<T, FeedError>;
