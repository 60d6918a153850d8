//! Feed configuration

use crate::backoff::BackoffPolicy;
use kucoin_auth::BASE_URL;
use kucoin_types::Instrument;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the book feed
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Instruments to mirror; fixed for the life of the feed
    pub instruments: Vec<Instrument>,
    /// REST base URL for tokens and snapshots
    pub rest_base_url: String,
    /// Websocket connect timeout
    pub connect_timeout: Duration,
    /// Timeout for the welcome frame and for all acks
    pub handshake_timeout: Duration,
    /// REST socket timeout
    pub rest_timeout: Duration,
    /// Minimum spacing between REST calls
    pub rest_min_interval: Duration,
    /// Retry schedule for REST calls
    pub rest_backoff: BackoffPolicy,
    /// Delay schedule between connection cycles
    pub restart_backoff: BackoffPolicy,
    /// Restarts allowed before giving up (None = forever)
    pub max_restarts: Option<u32>,
    /// Processed frames between verifications
    pub messages_per_verify: u64,
    /// Frames to let queue up before a verification fetch
    pub verify_preload: u64,
    /// Frames to let queue up before the initial loads
    pub init_preload: u64,
    /// Processed frames between periodic persists
    pub persist_every: u64,
    /// Frames to skip after a reset before persisting (None = twice `init_preload`)
    pub persist_warmup: Option<u64>,
    /// Directory for snapshot files
    pub snapshot_dir: PathBuf,
    /// Queue entries processed per arrival
    pub max_batch: usize,
    /// Frames between progress log lines
    pub progress_log_every: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            rest_base_url: BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            rest_timeout: Duration::from_secs(30),
            rest_min_interval: Duration::from_millis(3500),
            rest_backoff: BackoffPolicy::rest_default(),
            restart_backoff: BackoffPolicy::fixed(Duration::from_secs(5)),
            max_restarts: None,
            messages_per_verify: 92_000,
            verify_preload: 8_000,
            init_preload: 1_000,
            persist_every: 4_000,
            persist_warmup: None,
            snapshot_dir: PathBuf::from("books"),
            max_batch: 2,
            progress_log_every: 5_000,
        }
    }
}

impl FeedConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instruments
    pub fn with_instruments(mut self, instruments: impl IntoIterator<Item = Instrument>) -> Self {
        self.instruments = instruments.into_iter().collect();
        self
    }

    /// Set the REST base URL
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into();
        self
    }

    /// Set the websocket connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the REST socket timeout
    pub fn with_rest_timeout(mut self, timeout: Duration) -> Self {
        self.rest_timeout = timeout;
        self
    }

    /// Set the minimum spacing between REST calls
    pub fn with_rest_min_interval(mut self, interval: Duration) -> Self {
        self.rest_min_interval = interval;
        self
    }

    /// Set the REST retry schedule
    pub fn with_rest_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.rest_backoff = policy;
        self
    }

    /// Set the restart schedule
    pub fn with_restart_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.restart_backoff = policy;
        self
    }

    /// Limit the number of restarts
    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = Some(max);
        self
    }

    /// Set the verification cadence
    pub fn with_messages_per_verify(mut self, frames: u64) -> Self {
        self.messages_per_verify = frames;
        self
    }

    /// Set the verification preload
    pub fn with_verify_preload(mut self, frames: u64) -> Self {
        self.verify_preload = frames;
        self
    }

    /// Set the initial-load preload
    pub fn with_init_preload(mut self, frames: u64) -> Self {
        self.init_preload = frames;
        self
    }

    /// Set the persistence cadence
    pub fn with_persist_every(mut self, frames: u64) -> Self {
        self.persist_every = frames;
        self
    }

    /// Set the persistence warmup
    pub fn with_persist_warmup(mut self, frames: u64) -> Self {
        self.persist_warmup = Some(frames);
        self
    }

    /// Set the snapshot directory
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    /// Set the queue entries processed per arrival
    pub fn with_max_batch(mut self, entries: usize) -> Self {
        self.max_batch = entries.max(1);
        self
    }

    /// Set the progress log interval
    pub fn with_progress_log_every(mut self, frames: u64) -> Self {
        self.progress_log_every = frames;
        self
    }

    /// Frames after a reset before periodic persistence starts
    pub fn effective_persist_warmup(&self) -> u64 {
        self.persist_warmup
            .unwrap_or_else(|| self.init_preload.saturating_mul(2))
    }
}
