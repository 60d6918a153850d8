//! State shared by the supervisor, the ingestor and readers

use crate::config::FeedConfig;
use crate::events::FeedEvent;
use crate::loader::SnapshotLoader;
use crate::stats::FeedStats;
use crate::tunnel::RequestIds;
use kucoin_book::BookStore;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Between connection cycles
    Disconnected,
    /// Requesting a websocket token
    TokenFetch,
    /// Opening the websocket
    Connecting,
    /// Opening tunnels and waiting for acks
    Subscribing,
    /// Fetching initial snapshots
    InitLoad,
    /// Applying diffs
    Streaming,
    /// The last cycle ended on a transport or protocol error
    Error,
    /// The last cycle ended on a verification mismatch
    VerificationFailure,
    /// The last cycle ended on a sequence gap
    SequenceGap,
    /// The supervisor has exited
    Stopped,
}

impl FeedState {
    /// Whether books are being kept current
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

/// One-shot shutdown flag that async code can wait on
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Create an untriggered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether shutdown was requested
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Resolve once shutdown is requested
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything that outlives a single connection cycle
pub struct FeedContext<S> {
    /// Feed configuration
    pub config: FeedConfig,
    /// Books, shared with readers
    pub store: BookStore,
    /// REST snapshot fetcher
    pub loader: SnapshotLoader<S>,
    /// Request id counter
    pub ids: RequestIds,
    /// Counters
    pub stats: Arc<FeedStats>,
    /// Supervisor state
    pub state: Arc<RwLock<FeedState>>,
    /// Shutdown flag
    pub shutdown: Arc<ShutdownSignal>,
    events: mpsc::UnboundedSender<FeedEvent>,
}

impl<S> FeedContext<S> {
    /// Create a context; books start empty for every configured instrument
    pub fn new(
        config: FeedConfig,
        loader: SnapshotLoader<S>,
        events: mpsc::UnboundedSender<FeedEvent>,
    ) -> Self {
        let store = BookStore::new(&config.instruments);
        Self {
            config,
            store,
            loader,
            ids: RequestIds::new(),
            stats: Arc::new(FeedStats::new()),
            state: Arc::new(RwLock::new(FeedState::Disconnected)),
            shutdown: Arc::new(ShutdownSignal::new()),
            events,
        }
    }

    /// Current supervisor state
    pub fn state(&self) -> FeedState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: FeedState) {
        *self.state.write() = state;
    }

    /// Emit an event; dropped if nobody listens
    pub(crate) fn emit(&self, event: impl Into<FeedEvent>) {
        let _ = self.events.send(event.into());
    }
}
