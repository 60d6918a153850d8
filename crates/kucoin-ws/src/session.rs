//! Per-connection state
//!
//! Everything here is rebuilt on every connection cycle: the raw frame
//! queue, the pending verification, handshake bookkeeping and the
//! persistence rotation, which is re-read from the snapshot directory.

use crate::config::FeedConfig;
use crate::persistence::PersistenceManager;
use crate::queue::{FeedQueue, ReentrancyGuard};
use crate::tunnel::TunnelManager;
use kucoin_book::VerificationRequest;
use kucoin_types::Instrument;

/// What the queue processor does with each data arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMode {
    /// Let frames pile up before the initial snapshots are fetched
    InitPreload { remaining: u64 },
    /// Drain the queue
    Live,
    /// Let frames pile up before a verification snapshot is fetched
    VerifyPreload { instrument: Instrument, remaining: u64 },
}

/// State of one connection cycle
#[derive(Debug)]
pub struct SessionState {
    /// Raw data frames waiting to be applied
    pub queue: FeedQueue,
    /// Keeps queue processing single-entry
    pub guard: ReentrancyGuard,
    /// Verification waiting for its target sequence
    pub verification: Option<VerificationRequest>,
    /// Current processing mode
    pub mode: FeedMode,
    /// Handshake acks
    pub tunnels: TunnelManager,
    /// Snapshot rotation, seeded from files already on disk
    pub persistence: PersistenceManager,
    /// Data frames received
    pub frames: u64,
    /// Frames taken off the queue
    pub processed: u64,
    /// Frames processed since the last verification was scheduled
    pub since_verify: u64,
    /// Periodic persistence starts once `frames` passes this
    pub persist_after: u64,
    next_verify: usize,
}

impl SessionState {
    /// Fresh state for a new connection
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            queue: FeedQueue::new(),
            guard: ReentrancyGuard::new(),
            verification: None,
            mode: FeedMode::Live,
            tunnels: TunnelManager::new(),
            persistence: PersistenceManager::open(&config.snapshot_dir),
            frames: 0,
            processed: 0,
            since_verify: 0,
            persist_after: config.effective_persist_warmup(),
            next_verify: 0,
        }
    }

    /// Next instrument to verify, round-robin
    pub fn next_verification_target(&mut self, instruments: &[Instrument]) -> Option<Instrument> {
        if instruments.is_empty() {
            return None;
        }
        let instrument = instruments[self.next_verify % instruments.len()].clone();
        self.next_verify = self.next_verify.wrapping_add(1);
        Some(instrument)
    }

    /// Instrument of the pending verification, if any
    pub fn pending_instrument(&self) -> Option<&Instrument> {
        self.verification.as_ref().map(|v| &v.instrument)
    }

    /// Whether periodic persistence is past its warmup
    pub fn persistence_warmed_up(&self) -> bool {
        self.frames > self.persist_after
    }
}
