//! Instrument identifiers (BTC-USDT format)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spot instrument identifier in KuCoin's `BASE-QUOTE` format
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    /// Suffix appended to the instrument to name its multiplex tunnel
    pub const TUNNEL_SUFFIX: &'static str = "_books";
    /// Topic prefix of the full-depth incremental feed
    pub const LEVEL2_TOPIC: &'static str = "/market/level2:";

    /// Create an instrument without validation
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the instrument as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the base currency (e.g., "BTC" from "BTC-USDT")
    pub fn base(&self) -> Option<&str> {
        self.0.split('-').next()
    }

    /// Get the quote currency (e.g., "USDT" from "BTC-USDT")
    pub fn quote(&self) -> Option<&str> {
        self.0.split('-').nth(1)
    }

    /// Tunnel id carrying this instrument's book feed (e.g., "BTC-USDT_books")
    pub fn tunnel_id(&self) -> String {
        format!("{}{}", self.0, Self::TUNNEL_SUFFIX)
    }

    /// Level2 subscription topic (e.g., "/market/level2:BTC-USDT")
    pub fn level2_topic(&self) -> String {
        format!("{}{}", Self::LEVEL2_TOPIC, self.0)
    }
}

impl FromStr for Instrument {
    type Err = InstrumentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains('-') {
            return Err(InstrumentParseError::MissingDash(s.to_string()));
        }

        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 2 {
            return Err(InstrumentParseError::InvalidFormat(s.to_string()));
        }

        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(InstrumentParseError::EmptyPart(s.to_string()));
        }

        if s.chars().any(|c| c.is_whitespace() || c == '/' || c == ',') {
            return Err(InstrumentParseError::InvalidFormat(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Instrument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Instrument {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Error parsing an instrument
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentParseError {
    #[error("Instrument must contain '-': {0}")]
    MissingDash(String),

    #[error("Invalid instrument format: {0}")]
    InvalidFormat(String),

    #[error("Instrument has empty base or quote: {0}")]
    EmptyPart(String),
}
