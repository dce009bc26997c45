//! Order book reconstruction for the L3 replay backtester.
//!
//! This crate provides:
//! - Price levels with FIFO queues and tombstoned slots
//! - The order book engine (apply Add/Cancel/Modify/Execute, depth queries)
//! - Top-of-book change detection for market data emission

pub mod book;
pub mod level;

pub use book::OrderBookEngine;
pub use level::PriceLevel;
