//! REST client for the KuCoin market data endpoints
//!
//! The book mirror needs exactly one REST call: the signed full-depth
//! snapshot used for initial loads and verification.

pub mod client;
pub mod endpoints;
pub mod error;

pub use client::{ClientConfig, RestClient};
pub use endpoints::market::FULL_DEPTH_PATH;
pub use error::{RestError, RestResult};
pub use kucoin_auth::Credentials;
