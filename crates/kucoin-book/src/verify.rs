//! Snapshot-vs-live verification
//!
//! A [`VerificationRequest`] holds a REST reference book taken at
//! `target_sequence`. The live book is checked against it after every applied
//! change until the live sequence reaches (or skips past) the target.

use crate::orderbook::{BookSnapshot, OrderBook};
use kucoin_types::{Instrument, Level, Side};

/// Pending comparison of a live book against a REST reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// Instrument under verification
    pub instrument: Instrument,
    /// Sequence at which the reference was captured
    pub target_sequence: u64,
    /// Reference bids, best first
    pub reference_bids: Vec<Level>,
    /// Reference asks, best first
    pub reference_asks: Vec<Level>,
}

/// Result of checking a live book against a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Different instrument, or the live book has not reached the target yet
    Pending,
    /// Both sides match element-wise at the target sequence
    Confirmed,
    /// The live book differs from the reference at the target sequence
    Mismatch {
        /// First side found to differ
        side: Side,
    },
    /// The live book jumped past the target without ever sitting on it
    Gap,
}

impl VerifyOutcome {
    /// Whether the request is settled and must be cleared
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl VerificationRequest {
    /// Create a request from a reference snapshot
    pub fn new(
        instrument: Instrument,
        target_sequence: u64,
        reference_bids: Vec<Level>,
        reference_asks: Vec<Level>,
    ) -> Self {
        Self {
            instrument,
            target_sequence,
            reference_bids,
            reference_asks,
        }
    }

    /// Check a live book against this request
    pub fn evaluate(&self, book: &OrderBook) -> VerifyOutcome {
        if book.instrument() != &self.instrument {
            return VerifyOutcome::Pending;
        }

        let live = book.sequence();
        if live < self.target_sequence {
            return VerifyOutcome::Pending;
        }
        if live > self.target_sequence {
            return VerifyOutcome::Gap;
        }

        let storage = book.storage();
        if !storage.side_matches(Side::Bid, &self.reference_bids) {
            return VerifyOutcome::Mismatch { side: Side::Bid };
        }
        if !storage.side_matches(Side::Ask, &self.reference_asks) {
            return VerifyOutcome::Mismatch { side: Side::Ask };
        }
        VerifyOutcome::Confirmed
    }

    /// The reference as a book snapshot (for forensic persistence)
    pub fn reference_snapshot(&self) -> BookSnapshot {
        BookSnapshot::new(
            self.instrument.clone(),
            self.target_sequence,
            self.reference_bids.clone(),
            self.reference_asks.clone(),
        )
    }
}
