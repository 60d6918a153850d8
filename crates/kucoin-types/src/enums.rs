//! Book side enum

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Resting buy interest, best price is the highest
    Bid,
    /// Resting sell interest, best price is the lowest
    Ask,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }

    /// Returns the key used for this side in feed and snapshot payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bid => "bids",
            Self::Ask => "asks",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_payload_key() {
        assert_eq!(Side::Bid.to_string(), "bids");
        assert_eq!(Side::Ask.as_str(), "asks");
    }
}
