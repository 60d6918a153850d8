//! Shared per-instrument book store
//!
//! The feed task is the only writer; readers get immutable copies through
//! [`BookStore::current_book`] and [`BookStore::best_bid_ask`].

use crate::orderbook::{BestBidAsk, BookSnapshot, OrderBook};
use dashmap::DashMap;
use kucoin_types::{Instrument, Level};
use std::sync::Arc;

/// Cheaply cloneable handle to the live order books
#[derive(Debug, Clone, Default)]
pub struct BookStore {
    books: Arc<DashMap<String, OrderBook>>,
}

impl BookStore {
    /// Create a store with an empty book for each instrument
    pub fn new(instruments: &[Instrument]) -> Self {
        let store = Self::default();
        store.reset(instruments);
        store
    }

    /// Drop every book and start again from empty books at sequence zero
    pub fn reset(&self, instruments: &[Instrument]) {
        self.books.clear();
        for instrument in instruments {
            self.books
                .insert(instrument.to_string(), OrderBook::new(instrument.clone()));
        }
    }

    /// Replace one instrument's book wholesale with snapshot levels
    pub fn replace(&self, instrument: &Instrument, sequence: u64, bids: &[Level], asks: &[Level]) {
        self.books
            .entry(instrument.to_string())
            .and_modify(|book| book.replace(sequence, bids, asks))
            .or_insert_with(|| OrderBook::from_snapshot(instrument.clone(), sequence, bids, asks));
    }

    /// Whether the store tracks this instrument
    pub fn contains(&self, instrument: &str) -> bool {
        self.books.contains_key(instrument)
    }

    /// Immutable copy of an instrument's book
    pub fn current_book(&self, instrument: &str) -> Option<BookSnapshot> {
        self.books.get(instrument).map(|book| book.snapshot())
    }

    /// Best bid and best ask of an instrument's book
    pub fn best_bid_ask(&self, instrument: &str) -> Option<BestBidAsk> {
        self.books.get(instrument).map(|book| BestBidAsk {
            bid: book.best_bid().cloned(),
            ask: book.best_ask().cloned(),
        })
    }

    /// Current sequence of an instrument's book
    pub fn sequence(&self, instrument: &str) -> Option<u64> {
        self.books.get(instrument).map(|book| book.sequence())
    }

    /// Run `f` with exclusive access to one book
    pub fn with_book_mut<R>(&self, instrument: &str, f: impl FnOnce(&mut OrderBook) -> R) -> Option<R> {
        self.books.get_mut(instrument).map(|mut book| f(&mut *book))
    }

    /// Snapshots of every book, ordered by instrument
    pub fn snapshots(&self) -> Vec<BookSnapshot> {
        let mut all: Vec<BookSnapshot> = self.books.iter().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        all
    }

    /// Tracked instruments, sorted
    pub fn instruments(&self) -> Vec<Instrument> {
        let mut all: Vec<Instrument> = self.books.iter().map(|b| b.instrument().clone()).collect();
        all.sort();
        all
    }

    /// Number of tracked instruments
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether no instrument is tracked
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
