//! BTreeMap-based order book storage
//!
//! Provides O(log N) operations for full-depth books.
//! Uses `Reverse<Decimal>` for bids to maintain descending order.

use kucoin_types::{Level, Side};
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Result of writing a non-zero size at a price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No level existed at the price
    Inserted,
    /// An existing level's size was replaced
    Replaced,
}

/// Order book storage using BTreeMap for O(log N) operations
///
/// - Bids: keyed by `Reverse<Decimal>` (highest first)
/// - Asks: keyed by `Decimal` (lowest first)
#[derive(Debug, Clone, Default)]
pub struct TreeBook {
    bids: BTreeMap<Reverse<Decimal>, Level>,
    asks: BTreeMap<Decimal, Level>,
}

impl TreeBook {
    /// Create a new empty book
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    /// Build a book from snapshot levels; zero-size levels are skipped
    pub fn from_levels(bids: &[Level], asks: &[Level]) -> Self {
        let mut book = Self::new();
        for level in bids.iter().filter(|l| !l.is_zero()) {
            book.bids.insert(Reverse(level.price), level.clone());
        }
        for level in asks.iter().filter(|l| !l.is_zero()) {
            book.asks.insert(level.price, level.clone());
        }
        book
    }

    /// Insert a level or replace the size of an existing one
    ///
    /// Callers handle zero sizes through [`TreeBook::remove`].
    pub fn upsert(&mut self, side: Side, price: Decimal, size: Decimal) -> Upsert {
        let level = Level::new(price, size);
        let previous = match side {
            Side::Bid => self.bids.insert(Reverse(price), level),
            Side::Ask => self.asks.insert(price, level),
        };
        match previous {
            Some(_) => Upsert::Replaced,
            None => Upsert::Inserted,
        }
    }

    /// Remove a level; returns false if no level existed at the price
    pub fn remove(&mut self, side: Side, price: Decimal) -> bool {
        match side {
            Side::Bid => self.bids.remove(&Reverse(price)).is_some(),
            Side::Ask => self.asks.remove(&price).is_some(),
        }
    }

    /// Get the level at an exact price
    pub fn get(&self, side: Side, price: Decimal) -> Option<&Level> {
        match side {
            Side::Bid => self.bids.get(&Reverse(price)),
            Side::Ask => self.asks.get(&price),
        }
    }

    /// Whether `price` is the best price of `side`
    pub fn is_best(&self, side: Side, price: Decimal) -> bool {
        let best = match side {
            Side::Bid => self.best_bid_price(),
            Side::Ask => self.best_ask_price(),
        };
        best == Some(price)
    }

    /// Remove asks priced at or below `price`; returns how many were removed
    pub fn remove_asks_through(&mut self, price: Decimal) -> usize {
        let mut removed = 0;
        while let Some((&ask, _)) = self.asks.first_key_value() {
            if ask > price {
                break;
            }
            self.asks.remove(&ask);
            removed += 1;
        }
        removed
    }

    /// Remove bids priced at or above `price`; returns how many were removed
    pub fn remove_bids_through(&mut self, price: Decimal) -> usize {
        let mut removed = 0;
        while let Some((&Reverse(bid), _)) = self.bids.first_key_value() {
            if bid < price {
                break;
            }
            self.bids.remove(&Reverse(bid));
            removed += 1;
        }
        removed
    }

    /// Get the best bid (highest price)
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.values().next()
    }

    /// Get the best ask (lowest price)
    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.values().next()
    }

    /// Get the best bid price
    pub fn best_bid_price(&self) -> Option<Decimal> {
        self.best_bid().map(|l| l.price)
    }

    /// Get the best ask price
    pub fn best_ask_price(&self) -> Option<Decimal> {
        self.best_ask().map(|l| l.price)
    }

    /// Iterator over bids (highest to lowest price)
    pub fn bids(&self) -> impl Iterator<Item = &Level> {
        self.bids.values()
    }

    /// Iterator over asks (lowest to highest price)
    pub fn asks(&self) -> impl Iterator<Item = &Level> {
        self.asks.values()
    }

    /// Get bids as a vector (for snapshots and persistence)
    pub fn bids_vec(&self) -> Vec<Level> {
        self.bids.values().cloned().collect()
    }

    /// Get asks as a vector (for snapshots and persistence)
    pub fn asks_vec(&self) -> Vec<Level> {
        self.asks.values().cloned().collect()
    }

    /// Element-wise comparison of one side against reference levels
    pub fn side_matches(&self, side: Side, reference: &[Level]) -> bool {
        match side {
            Side::Bid => self.bids.len() == reference.len() && self.bids().eq(reference.iter()),
            Side::Ask => self.asks.len() == reference.len() && self.asks().eq(reference.iter()),
        }
    }

    /// Number of bid levels
    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask levels
    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// Check if the book is empty
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Clear all levels
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bid_order() {
        let mut book = TreeBook::new();
        book.upsert(Side::Bid, dec!(100), dec!(1));
        book.upsert(Side::Bid, dec!(101), dec!(2));
        book.upsert(Side::Bid, dec!(99), dec!(3));

        let prices: Vec<_> = book.bids().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(101), dec!(100), dec!(99)]);
    }

    #[test]
    fn test_ask_order() {
        let mut book = TreeBook::new();
        book.upsert(Side::Ask, dec!(100), dec!(1));
        book.upsert(Side::Ask, dec!(101), dec!(2));
        book.upsert(Side::Ask, dec!(99), dec!(3));

        let prices: Vec<_> = book.asks().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(99), dec!(100), dec!(101)]);
    }

    #[test]
    fn test_upsert_reports_replace() {
        let mut book = TreeBook::new();
        assert_eq!(book.upsert(Side::Bid, dec!(100), dec!(1)), Upsert::Inserted);
        assert_eq!(book.upsert(Side::Bid, dec!(100.0), dec!(4)), Upsert::Replaced);
        assert_eq!(book.bid_count(), 1);
        assert_eq!(book.get(Side::Bid, dec!(100)).unwrap().size, dec!(4));
    }

    #[test]
    fn test_remove_absent_level() {
        let mut book = TreeBook::new();
        book.upsert(Side::Ask, dec!(5), dec!(1));
        assert!(!book.remove(Side::Ask, dec!(6)));
        assert!(book.remove(Side::Ask, dec!(5)));
        assert!(book.is_empty());
    }

    #[test]
    fn test_remove_through() {
        let mut book = TreeBook::new();
        for p in [dec!(10), dec!(11), dec!(12)] {
            book.upsert(Side::Ask, p, dec!(1));
        }
        for p in [dec!(9), dec!(8), dec!(7)] {
            book.upsert(Side::Bid, p, dec!(1));
        }

        assert_eq!(book.remove_asks_through(dec!(11)), 2);
        assert_eq!(book.best_ask_price(), Some(dec!(12)));

        assert_eq!(book.remove_bids_through(dec!(8.5)), 1);
        assert_eq!(book.best_bid_price(), Some(dec!(8)));

        assert_eq!(book.remove_bids_through(dec!(100)), 0);
    }

    #[test]
    fn test_side_matches() {
        let book = TreeBook::from_levels(
            &[Level::new(dec!(9), dec!(1)), Level::new(dec!(8), dec!(2))],
            &[Level::new(dec!(10), dec!(3))],
        );
        assert!(book.side_matches(Side::Bid, &[Level::new(dec!(9), dec!(1)), Level::new(dec!(8), dec!(2))]));
        assert!(!book.side_matches(Side::Bid, &[Level::new(dec!(9), dec!(1))]));
        assert!(!book.side_matches(Side::Ask, &[Level::new(dec!(10), dec!(2))]));
    }

    #[test]
    fn test_from_levels_skips_zero() {
        let book = TreeBook::from_levels(&[Level::new(dec!(9), dec!(0))], &[]);
        assert!(book.is_empty());
    }
}
