//! Full-depth order book engine for the KuCoin level2 feed
//!
//! This crate holds the books and everything that mutates them. It has no
//! networking and no async runtime: the feed crate drives it.
//!
//! # Example
//!
//! ```
//! use kucoin_book::{BookStore, BookSynchronizer};
//! use kucoin_types::{DiffMessage, Instrument};
//!
//! let store = BookStore::new(&[Instrument::from("BTC-USDT")]);
//! let sync = BookSynchronizer::new(store.clone());
//!
//! let msg = DiffMessage::parse(
//!     r#"{"type":"message","subject":"trade.l2update","data":{"sequenceStart":1,"sequenceEnd":1,"symbol":"BTC-USDT","changes":{"asks":[],"bids":[["9.5","3","1"]]}}}"#,
//! ).unwrap();
//! sync.apply(&msg, &mut None).unwrap();
//!
//! let top = store.best_bid_ask("BTC-USDT").unwrap();
//! assert_eq!(top.bid.unwrap().price.to_string(), "9.5");
//! ```
//!
//! # Features
//!
//! - **Sorted storage**: BTreeMap-backed sides, bids descending, asks ascending
//! - **Sequence discipline**: stale changes are skipped, every other change advances the sequence
//! - **Cross-book correction**: a new best level clears crossed levels on the other side
//! - **Verification**: element-wise comparison against a REST reference at a target sequence

pub mod orderbook;
pub mod storage;
pub mod store;
pub mod sync;
pub mod verify;

pub use orderbook::{BestBidAsk, BookSnapshot, ChangeOutcome, OrderBook};
pub use storage::{TreeBook, Upsert};
pub use store::BookStore;
pub use sync::{BookSynchronizer, SequenceJump, SyncError, SyncReport};
pub use verify::{VerificationRequest, VerifyOutcome};
