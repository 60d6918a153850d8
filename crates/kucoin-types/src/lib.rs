//! Shared types for the KuCoin level2 book feed
//!
//! This crate provides the core type definitions used across the workspace.
//! It has minimal dependencies and can be used independently.
//!
//! # Key Types
//!
//! - [`Instrument`] - Trading pair identifiers (e.g., "BTC-USDT")
//! - [`Level`] - Price level with decimal precision
//! - [`Side`] - Bid or ask
//! - [`TunnelRequest`], [`FrameHeader`] - Multiplexed websocket protocol
//! - [`DiffMessage`] - Parsed incremental book update
//! - [`ApiEnvelope`], [`DepthSnapshot`], [`BulletToken`] - REST payloads
//! - [`FeedError`] - Error taxonomy

pub mod diff;
pub mod enums;
pub mod error;
pub mod instrument;
pub mod level;
pub mod messages;
pub mod rest;

// Re-export commonly used types
pub use diff::*;
pub use enums::*;
pub use error::*;
pub use instrument::*;
pub use level::*;
pub use messages::*;
pub use rest::*;

// Re-export rust_decimal for users
pub use rust_decimal::Decimal;
