//! Core types and configuration for the L3 replay backtester.
//!
//! This crate provides shared types used across all other crates:
//! - Raw L3 book events, snapshots, order intents and fills
//! - Run configuration
//! - The fatal/recoverable error taxonomy

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LimitPolicy, StrategyKind, StrategyParams, TestScenario};
pub use error::{BookError, Error, ExecError, MalformedEvent, Result};
pub use types::*;
