//! Latency-aware backtesting for the L3 replay backtester.
//!
//! This crate provides:
//! - The simulation clock and event timeline
//! - Depth-walking execution with resting limit orders
//! - The strategy interface and built-in strategies
//! - Portfolio accounting and performance metrics
//! - The run driver tying them together

pub mod execution;
pub mod metrics;
pub mod portfolio;
pub mod runner;
pub mod scheduler;
pub mod strategy;

pub use execution::ExecutionSimulator;
pub use metrics::{BacktestMetrics, MetricsCalculator};
pub use portfolio::{ClosedTrade, Portfolio, PortfolioSummary};
pub use runner::{run_backtest, Backtest, BacktestReport, RunError, RunStats};
pub use scheduler::{EventHeader, EventScheduler, SimEvent};
pub use strategy::{build_strategy, BracketParams, BracketStrategy, PassiveStrategy, Strategy};
