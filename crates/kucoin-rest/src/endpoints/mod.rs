//! Endpoint groups

pub mod market;

pub use market::MarketEndpoints;
