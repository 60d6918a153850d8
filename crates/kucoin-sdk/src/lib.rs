//! High-level SDK for mirroring KuCoin full-depth order books
//!
//! This crate wires the REST snapshot client, the websocket token provider
//! and the multiplexed level2 feed into a single handle. The feed keeps every
//! configured book current, periodically checks it against a fresh snapshot
//! and restarts from scratch when a check fails.
//!
//! # Quick Start
//!
//! ```no_run
//! use kucoin_sdk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut mirror = BookMirror::builder(["BTC-USDT", "ETH-USDT"])
//!         .with_snapshot_dir("./books")
//!         .start()?;
//!
//!     let mut events = mirror.events().unwrap();
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             FeedEvent::Book(BookEvent::VerificationConfirmed { instrument, sequence }) => {
//!                 println!("{} verified at {}", instrument, sequence);
//!             }
//!             FeedEvent::Connection(ConnectionEvent::Disconnected { reason }) => {
//!                 println!("disconnected: {:?}", reason);
//!             }
//!             _ => {}
//!         }
//!         if let Some(mid) = mirror.mid_price("BTC-USDT") {
//!             println!("BTC-USDT mid = {}", mid);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **One connection**: all instruments share a websocket via tunnels
//! - **Verified books**: live state is compared against REST snapshots
//! - **Forensics**: mismatching books are written to disk for inspection
//! - **Supervised**: connection cycles restart with backoff

pub mod builder;
pub mod client;
pub mod prelude;

// Re-export main types
pub use builder::{BookMirrorBuilder, ConfigError, CredentialSource};
pub use client::BookMirror;

// Re-export commonly used types from dependencies
pub use kucoin_auth::Credentials;
pub use kucoin_book::{BestBidAsk, BookSnapshot};
pub use kucoin_types::{FeedError, FeedResult, Instrument, Level};
pub use kucoin_ws::{BackoffPolicy, FeedConfig, FeedEvent, FeedState, StatsSnapshot};
