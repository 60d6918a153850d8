//! Re-exports for convenience
//!
//! Import everything you need with:
//! ```
//! use kucoin_sdk::prelude::*;
//! ```

// Mirror
pub use crate::builder::{BookMirrorBuilder, ConfigError, CredentialSource};
pub use crate::client::BookMirror;

// Types from kucoin-types
pub use kucoin_types::{DepthSnapshot, FeedError, FeedResult, Instrument, Level, Side};

// Credentials
pub use kucoin_auth::Credentials;

// Feed types
pub use kucoin_ws::{
    BackoffPolicy, BookEvent, ConnectionEvent, DisconnectReason, FeedConfig, FeedEvent,
    FeedState, StatsSnapshot,
};

// Book types
pub use kucoin_book::{BestBidAsk, BookSnapshot};

// Decimal for prices/quantities
pub use rust_decimal::Decimal;
