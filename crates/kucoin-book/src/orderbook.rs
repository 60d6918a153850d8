//! Per-instrument order book with sequence tracking

use crate::storage::{TreeBook, Upsert};
use kucoin_types::{BookChange, Decimal, Instrument, Level, Side};
use serde::{Deserialize, Serialize};

/// What applying a single change did to the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Sequence at or below the book's; nothing changed
    Stale,
    /// Price zero; only the sequence advanced
    SequenceOnly,
    /// A level was deleted
    Removed,
    /// Delete for a price that is not in the book; only the sequence advanced
    RemoveMissing,
    /// An existing level's size was replaced
    Updated,
    /// A new level was inserted, possibly clearing crossed levels on the other side
    Inserted {
        /// Opposite-side levels removed because the insert became the new best
        crossed_removed: usize,
    },
}

impl ChangeOutcome {
    /// Whether the change advanced the book sequence
    pub fn advanced(&self) -> bool {
        !matches!(self, Self::Stale)
    }
}

/// Full-depth order book for one instrument
#[derive(Debug, Clone)]
pub struct OrderBook {
    instrument: Instrument,
    sequence: u64,
    storage: TreeBook,
}

impl OrderBook {
    /// Create an empty book at sequence zero
    pub fn new(instrument: impl Into<Instrument>) -> Self {
        Self {
            instrument: instrument.into(),
            sequence: 0,
            storage: TreeBook::new(),
        }
    }

    /// Build a book from snapshot levels
    pub fn from_snapshot(
        instrument: impl Into<Instrument>,
        sequence: u64,
        bids: &[Level],
        asks: &[Level],
    ) -> Self {
        Self {
            instrument: instrument.into(),
            sequence,
            storage: TreeBook::from_levels(bids, asks),
        }
    }

    /// Replace the whole book with snapshot contents
    pub fn replace(&mut self, sequence: u64, bids: &[Level], asks: &[Level]) {
        self.storage = TreeBook::from_levels(bids, asks);
        self.sequence = sequence;
    }

    /// Apply one change record
    ///
    /// The sequence advances for every non-stale record, including price-zero
    /// records and deletes of prices the book does not hold.
    pub fn apply_change(&mut self, change: &BookChange) -> ChangeOutcome {
        if change.sequence <= self.sequence {
            return ChangeOutcome::Stale;
        }

        let outcome = if change.is_sequence_only() {
            ChangeOutcome::SequenceOnly
        } else if change.size.is_zero() {
            if self.storage.remove(change.side, change.price) {
                ChangeOutcome::Removed
            } else {
                ChangeOutcome::RemoveMissing
            }
        } else {
            match self.storage.upsert(change.side, change.price, change.size) {
                Upsert::Replaced => ChangeOutcome::Updated,
                Upsert::Inserted => ChangeOutcome::Inserted {
                    crossed_removed: self.uncross(change.side, change.price),
                },
            }
        };

        self.sequence = change.sequence;
        outcome
    }

    /// A freshly inserted best level consumes opposite levels at or through its price
    fn uncross(&mut self, side: Side, price: Decimal) -> usize {
        if !self.storage.is_best(side, price) {
            return 0;
        }
        match side {
            Side::Bid => self.storage.remove_asks_through(price),
            Side::Ask => self.storage.remove_bids_through(price),
        }
    }

    /// Get the instrument
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Sequence of the last applied change or snapshot
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Underlying sorted storage
    pub fn storage(&self) -> &TreeBook {
        &self.storage
    }

    /// Get the best bid
    pub fn best_bid(&self) -> Option<&Level> {
        self.storage.best_bid()
    }

    /// Get the best ask
    pub fn best_ask(&self) -> Option<&Level> {
        self.storage.best_ask()
    }

    /// Get the spread (best ask - best bid)
    pub fn spread(&self) -> Option<Decimal> {
        match (self.storage.best_ask_price(), self.storage.best_bid_price()) {
            (Some(ask), Some(bid)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get the mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.storage.best_ask_price(), self.storage.best_bid_price()) {
            (Some(ask), Some(bid)) => Some((ask + bid) / Decimal::TWO),
            _ => None,
        }
    }

    /// Number of bid levels
    pub fn bid_count(&self) -> usize {
        self.storage.bid_count()
    }

    /// Number of ask levels
    pub fn ask_count(&self) -> usize {
        self.storage.ask_count()
    }

    /// Clear all levels and the sequence
    pub fn reset(&mut self) {
        self.storage.clear();
        self.sequence = 0;
    }

    /// Create an immutable snapshot of the current state
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            instrument: self.instrument.clone(),
            sequence: self.sequence,
            bids: self.storage.bids_vec(),
            asks: self.storage.asks_vec(),
        }
    }
}

/// Immutable copy of an order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Instrument the book belongs to
    pub instrument: Instrument,
    /// Sequence the levels are consistent with
    pub sequence: u64,
    /// Bid levels, best first
    pub bids: Vec<Level>,
    /// Ask levels, best first
    pub asks: Vec<Level>,
}

impl BookSnapshot {
    /// Create a snapshot from raw levels
    pub fn new(instrument: Instrument, sequence: u64, bids: Vec<Level>, asks: Vec<Level>) -> Self {
        Self {
            instrument,
            sequence,
            bids,
            asks,
        }
    }

    /// Get the best bid price
    pub fn best_bid_price(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price
    pub fn best_ask_price(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get the spread
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask_price(), self.best_bid_price()) {
            (Some(ask), Some(bid)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get the mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_ask_price(), self.best_bid_price()) {
            (Some(ask), Some(bid)) => Some((ask + bid) / Decimal::TWO),
            _ => None,
        }
    }
}

/// Top of book for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestBidAsk {
    /// Highest bid, if any
    pub bid: Option<Level>,
    /// Lowest ask, if any
    pub ask: Option<Level>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bid(price: Decimal, size: Decimal, seq: u64) -> BookChange {
        BookChange::new(Side::Bid, price, size, seq)
    }

    fn ask(price: Decimal, size: Decimal, seq: u64) -> BookChange {
        BookChange::new(Side::Ask, price, size, seq)
    }

    #[test]
    fn test_insert_delete_sequence() {
        let mut book = OrderBook::new("BTC-USDT");
        book.apply_change(&bid(dec!(10.0), dec!(5), 100));
        book.apply_change(&bid(dec!(10.0), dec!(0), 101));
        book.apply_change(&bid(dec!(9.5), dec!(3), 102));

        let snap = book.snapshot();
        assert_eq!(snap.bids, vec![Level::new(dec!(9.5), dec!(3))]);
        assert!(snap.asks.is_empty());
        assert_eq!(snap.sequence, 102);
    }

    #[test]
    fn test_stale_change_applies_once() {
        let mut book = OrderBook::new("BTC-USDT");
        assert_eq!(
            book.apply_change(&bid(dec!(10), dec!(1), 5)),
            ChangeOutcome::Inserted { crossed_removed: 0 }
        );
        assert_eq!(book.apply_change(&bid(dec!(10), dec!(7), 5)), ChangeOutcome::Stale);
        assert_eq!(book.apply_change(&bid(dec!(11), dec!(7), 4)), ChangeOutcome::Stale);
        assert_eq!(book.best_bid().unwrap().size, dec!(1));
        assert_eq!(book.bid_count(), 1);
        assert_eq!(book.sequence(), 5);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut book = OrderBook::from_snapshot(
            "BTC-USDT",
            10,
            &[Level::new(dec!(9), dec!(1))],
            &[Level::new(dec!(11), dec!(1))],
        );
        assert_eq!(
            book.apply_change(&bid(dec!(8), dec!(0), 11)),
            ChangeOutcome::RemoveMissing
        );
        assert_eq!(book.bid_count(), 1);
        assert_eq!(book.sequence(), 11);
    }

    #[test]
    fn test_sequence_only_record() {
        let mut book = OrderBook::new("XMR-USDT");
        let outcome = book.apply_change(&bid(dec!(0), dec!(0), 1617361515152));
        assert_eq!(outcome, ChangeOutcome::SequenceOnly);
        assert_eq!(book.sequence(), 1617361515152);
        assert_eq!(book.bid_count(), 0);
    }

    #[test]
    fn test_new_best_bid_clears_crossed_asks() {
        let mut book = OrderBook::from_snapshot(
            "BTC-USDT",
            1,
            &[Level::new(dec!(99), dec!(1))],
            &[
                Level::new(dec!(100), dec!(1)),
                Level::new(dec!(101), dec!(1)),
                Level::new(dec!(102), dec!(1)),
            ],
        );
        let outcome = book.apply_change(&bid(dec!(101), dec!(2), 2));
        assert_eq!(outcome, ChangeOutcome::Inserted { crossed_removed: 2 });
        assert_eq!(book.best_ask().unwrap().price, dec!(102));
        assert_eq!(book.best_bid().unwrap().price, dec!(101));
    }

    #[test]
    fn test_new_best_ask_clears_crossed_bids() {
        let mut book = OrderBook::from_snapshot(
            "BTC-USDT",
            1,
            &[Level::new(dec!(99), dec!(1)), Level::new(dec!(98), dec!(1))],
            &[Level::new(dec!(100), dec!(1))],
        );
        let outcome = book.apply_change(&ask(dec!(98.5), dec!(2), 2));
        assert_eq!(outcome, ChangeOutcome::Inserted { crossed_removed: 1 });
        assert_eq!(book.best_bid().unwrap().price, dec!(98));
        assert_eq!(book.best_ask().unwrap().price, dec!(98.5));
    }

    #[test]
    fn test_insert_behind_best_leaves_other_side() {
        let mut book = OrderBook::from_snapshot(
            "BTC-USDT",
            1,
            &[Level::new(dec!(99), dec!(1))],
            &[Level::new(dec!(100), dec!(1))],
        );
        let outcome = book.apply_change(&bid(dec!(98), dec!(2), 2));
        assert_eq!(outcome, ChangeOutcome::Inserted { crossed_removed: 0 });
        assert_eq!(book.ask_count(), 1);
    }

    #[test]
    fn test_size_update_does_not_uncross() {
        let mut book = OrderBook::from_snapshot(
            "BTC-USDT",
            1,
            &[Level::new(dec!(99), dec!(1))],
            &[Level::new(dec!(100), dec!(1))],
        );
        assert_eq!(book.apply_change(&bid(dec!(99), dec!(4), 2)), ChangeOutcome::Updated);
        assert_eq!(book.ask_count(), 1);
    }

    #[test]
    fn test_spread_and_mid() {
        let book = OrderBook::from_snapshot(
            "BTC-USDT",
            1,
            &[Level::new(dec!(99), dec!(1))],
            &[Level::new(dec!(101), dec!(1))],
        );
        assert_eq!(book.spread(), Some(dec!(2)));
        assert_eq!(book.mid_price(), Some(dec!(100)));
        assert_eq!(book.snapshot().mid_price(), Some(dec!(100)));
    }
}
