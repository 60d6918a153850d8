//! Mirror Builder
//!
//! Fluent configuration for a [`BookMirror`](crate::BookMirror), validated
//! before anything is spawned.
//!
//! # Example
//!
//! ```
//! use kucoin_sdk::builder::BookMirrorBuilder;
//! use std::time::Duration;
//!
//! let builder = BookMirrorBuilder::new(["BTC-USDT", "ETH-USDT"])
//!     .with_snapshot_dir("/tmp/books")
//!     .with_restart_delay(Duration::from_secs(5));
//! assert!(builder.validate().is_ok());
//! ```

use kucoin_auth::Credentials;
use kucoin_types::{FeedError, Instrument};
use kucoin_ws::{BackoffPolicy, FeedConfig};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No instruments specified
    #[error("at least one instrument must be specified")]
    NoInstruments,

    /// Instrument not in BASE-QUOTE form
    #[error("invalid instrument {instrument}: {reason} (expected format: BASE-QUOTE, e.g., BTC-USDT)")]
    InvalidInstrument { instrument: String, reason: String },

    /// Same instrument listed twice
    #[error("instrument {instrument} listed more than once")]
    DuplicateInstrument { instrument: String },

    /// Verification cadence of zero frames
    #[error("messages_per_verify must be greater than zero")]
    ZeroCadence,

    /// Timeout too short
    #[error("connect and handshake timeouts must be at least 1 second")]
    TimeoutTooShort,
}

impl From<ConfigError> for FeedError {
    fn from(err: ConfigError) -> Self {
        FeedError::Configuration(err.to_string())
    }
}

/// Where REST credentials come from
#[derive(Debug, Clone, Default)]
pub enum CredentialSource {
    /// `KUCOIN_API_KEY`, `KUCOIN_API_SECRET`, `KUCOIN_API_PASSPHRASE`
    #[default]
    Environment,
    /// Supplied by the caller
    Explicit(Credentials),
    /// No credentials; the full-depth endpoint will refuse snapshot calls
    Anonymous,
}

/// Builder for a [`BookMirror`](crate::BookMirror)
#[derive(Debug, Clone)]
pub struct BookMirrorBuilder {
    /// Instruments to mirror, as given
    pub instruments: Vec<String>,
    /// Feed settings; `instruments` is filled in at build time
    pub feed: FeedConfig,
    /// REST credentials
    pub credentials: CredentialSource,
}

impl BookMirrorBuilder {
    /// Create a builder for the given instruments
    ///
    /// # Example
    ///
    /// ```
    /// use kucoin_sdk::builder::BookMirrorBuilder;
    ///
    /// let builder = BookMirrorBuilder::new(["BTC-USDT"]);
    /// assert_eq!(builder.instruments.len(), 1);
    /// ```
    pub fn new(instruments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            instruments: instruments.into_iter().map(Into::into).collect(),
            feed: FeedConfig::default(),
            credentials: CredentialSource::default(),
        }
    }

    /// Add a single instrument
    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instruments.push(instrument.into());
        self
    }

    /// Replace all feed settings
    pub fn with_feed_config(mut self, feed: FeedConfig) -> Self {
        self.feed = feed;
        self
    }

    /// Use explicit credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = CredentialSource::Explicit(credentials);
        self
    }

    /// Run without credentials
    pub fn without_credentials(mut self) -> Self {
        self.credentials = CredentialSource::Anonymous;
        self
    }

    /// Set the REST base URL
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.feed = self.feed.with_rest_base_url(url);
        self
    }

    /// Set the snapshot directory
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.feed = self.feed.with_snapshot_dir(dir);
        self
    }

    /// Set the websocket connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.feed = self.feed.with_connect_timeout(timeout);
        self
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.feed = self.feed.with_handshake_timeout(timeout);
        self
    }

    /// Set the verification cadence
    pub fn with_messages_per_verify(mut self, frames: u64) -> Self {
        self.feed = self.feed.with_messages_per_verify(frames);
        self
    }

    /// Set the verification preload
    pub fn with_verify_preload(mut self, frames: u64) -> Self {
        self.feed = self.feed.with_verify_preload(frames);
        self
    }

    /// Set the initial-load preload
    pub fn with_init_preload(mut self, frames: u64) -> Self {
        self.feed = self.feed.with_init_preload(frames);
        self
    }

    /// Set the persistence cadence
    pub fn with_persist_every(mut self, frames: u64) -> Self {
        self.feed = self.feed.with_persist_every(frames);
        self
    }

    /// Set the fixed delay between connection cycles
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.feed = self.feed.with_restart_backoff(BackoffPolicy::fixed(delay));
        self
    }

    /// Set the REST retry schedule
    pub fn with_rest_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.feed = self.feed.with_rest_backoff(policy);
        self
    }

    /// Give up after this many restarts
    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.feed = self.feed.with_max_restarts(max);
        self
    }

    /// Check the configuration and parse the instruments
    pub fn validate(&self) -> Result<Vec<Instrument>, ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::NoInstruments);
        }

        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(self.instruments.len());
        for raw in &self.instruments {
            let instrument: Instrument =
                raw.parse().map_err(|e: kucoin_types::InstrumentParseError| {
                    ConfigError::InvalidInstrument {
                        instrument: raw.clone(),
                        reason: e.to_string(),
                    }
                })?;
            if !seen.insert(instrument.clone()) {
                return Err(ConfigError::DuplicateInstrument {
                    instrument: raw.clone(),
                });
            }
            parsed.push(instrument);
        }

        if self.feed.messages_per_verify == 0 {
            return Err(ConfigError::ZeroCadence);
        }

        let min = Duration::from_secs(1);
        if self.feed.connect_timeout < min || self.feed.handshake_timeout < min {
            return Err(ConfigError::TimeoutTooShort);
        }

        Ok(parsed)
    }

    /// Validated feed configuration
    pub fn feed_config(&self) -> Result<FeedConfig, ConfigError> {
        let instruments = self.validate()?;
        Ok(self.feed.clone().with_instruments(instruments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = BookMirrorBuilder::new(["BTC-USDT"]);
        assert!(matches!(builder.credentials, CredentialSource::Environment));
        assert_eq!(builder.feed.messages_per_verify, 92_000);

        let config = builder.feed_config().unwrap();
        assert_eq!(config.instruments, vec![Instrument::from("BTC-USDT")]);
    }

    #[test]
    fn test_no_instruments() {
        let builder = BookMirrorBuilder::new(Vec::<String>::new());
        assert_eq!(builder.validate(), Err(ConfigError::NoInstruments));
    }

    #[test]
    fn test_invalid_instrument() {
        let err = BookMirrorBuilder::new(["BTC/USDT"]).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInstrument { ref instrument, .. } if instrument == "BTC/USDT"));
        assert!(err.to_string().contains("BASE-QUOTE"));
    }

    #[test]
    fn test_duplicate_instrument() {
        let err = BookMirrorBuilder::new(["BTC-USDT", "ETH-USDT"])
            .with_instrument("BTC-USDT")
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateInstrument {
                instrument: "BTC-USDT".into()
            }
        );
    }

    #[test]
    fn test_zero_cadence_and_short_timeout() {
        let zero = BookMirrorBuilder::new(["BTC-USDT"]).with_messages_per_verify(0);
        assert_eq!(zero.validate(), Err(ConfigError::ZeroCadence));

        let short = BookMirrorBuilder::new(["BTC-USDT"])
            .with_handshake_timeout(Duration::from_millis(100));
        assert_eq!(short.validate(), Err(ConfigError::TimeoutTooShort));
    }

    #[test]
    fn test_config_error_into_feed_error() {
        let err: FeedError = ConfigError::NoInstruments.into();
        assert!(err.is_unrecoverable());
    }
}
