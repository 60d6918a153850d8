//! KuCoin level2 feed over one multiplexed websocket
//!
//! This crate keeps full-depth books current for a fixed set of instruments:
//! it opens a tunnel per instrument, seeds each book from a REST snapshot,
//! replays diffs, periodically verifies the live books against fresh
//! snapshots and persists them to disk.
//!
//! # Features
//!
//! - Handshake with per-request acknowledgement and timeouts
//! - Keep-alive pings on the interval advertised by the token
//! - Frames keep being queued while REST loads are in flight
//! - Round-robin verification with forensic snapshots on failure
//! - Supervisor that restarts the pipeline from scratch after any failure
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kucoin_auth::TokenProvider;
//! use kucoin_rest::RestClient;
//! use kucoin_types::Instrument;
//! use kucoin_ws::{FeedConfig, FeedContext, SnapshotLoader, Supervisor, WsConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FeedConfig::new().with_instruments([Instrument::from("BTC-USDT")]);
//!     let loader = SnapshotLoader::new(
//!         RestClient::new()?,
//!         config.rest_backoff.clone(),
//!         config.rest_min_interval,
//!     );
//!     let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//!     let ctx = Arc::new(FeedContext::new(config, loader, tx));
//!     let supervisor = Supervisor::new(WsConnector::default(), TokenProvider::new(None)?, ctx);
//!
//!     tokio::spawn(async move { supervisor.run().await });
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod config;
pub mod context;
pub mod events;
pub mod ingestor;
pub mod loader;
pub mod persistence;
pub mod queue;
pub mod session;
pub mod stats;
pub mod supervisor;
pub mod transport;
pub mod tunnel;

// Re-export main types
pub use backoff::{retry, BackoffPolicy};
pub use config::FeedConfig;
pub use context::{FeedContext, FeedState, ShutdownSignal};
pub use events::{BookEvent, ConnectionEvent, DisconnectReason, FeedEvent};
pub use ingestor::FeedIngestor;
pub use loader::{apply_load, LoadMode, LoadOutcome, SnapshotLoader, SnapshotSource, TokenSource};
pub use persistence::{
    is_busy, read_snapshot, PersistError, PersistedSnapshot, PersistenceManager, SnapshotKind,
    BUSY_CONTENTS, BUSY_MARKER, GENERATIONS,
};
pub use queue::{FeedQueue, GuardPermit, ReentrancyGuard};
pub use session::{FeedMode, SessionState};
pub use stats::{FeedStats, StatsSnapshot};
pub use supervisor::Supervisor;
pub use transport::{Connector, Transport, TransportError, WsConnector, WsTransport};
pub use tunnel::{PendingAck, RequestIds, TunnelManager};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{MockConnector, MockTransport};
