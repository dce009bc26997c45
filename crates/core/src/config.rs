//! Run configuration.
//!
//! A [`Config`] is built once at run start, validated, and then passed by
//! reference to every component that needs it. Nothing reads configuration
//! from ambient state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Latency, PriceTicks};

/// Opaque parameters handed through to the strategy.
pub type StrategyParams = BTreeMap<String, serde_json::Value>;

/// Synthetic event sequences that replace the data collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestScenario {
    /// Long entry, price rises to the target.
    LongTarget,
    /// Long entry, price falls to the stop.
    LongStop,
    /// Short entry, price falls to the target.
    ShortTarget,
    /// Short entry, price rises to the stop.
    ShortStop,
}

impl TestScenario {
    /// Whether the scenario enters long.
    pub fn is_long(self) -> bool {
        matches!(self, TestScenario::LongTarget | TestScenario::LongStop)
    }

    /// Whether the scenario exits at the target (as opposed to the stop).
    pub fn hits_target(self) -> bool {
        matches!(self, TestScenario::LongTarget | TestScenario::ShortTarget)
    }

    pub fn name(self) -> &'static str {
        match self {
            TestScenario::LongTarget => "long_target",
            TestScenario::LongStop => "long_stop",
            TestScenario::ShortTarget => "short_target",
            TestScenario::ShortStop => "short_stop",
        }
    }
}

/// Concrete strategy selected for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Single entry with target/stop exits.
    #[default]
    Bracket,
    /// Observes market data, never trades.
    Passive,
}

/// What happens to the unfilled part of a limit intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPolicy {
    /// Reject the whole intent unless it fills completely.
    FillOrKill,
    /// Keep the remainder as a standing simulated order.
    #[default]
    Resting,
}

/// Main configuration for a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrument identifier (data scoping only).
    pub symbol: String,
    /// SQLite database holding the L3 event table.
    pub db_path: Option<PathBuf>,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Currency value of one tick.
    pub tick_value: f64,
    /// Initial portfolio capital.
    pub capital: f64,
    /// Commission per contract per side.
    pub commission: f64,
    /// Delay between book-derived market data and strategy delivery (us).
    pub latency_data_signal_us: i64,
    /// Delay between strategy intent and execution delivery (us).
    pub latency_signal_order_us: i64,
    /// Passed through to the strategy untouched.
    pub strategy_params: StrategyParams,
    /// Synthetic scenario to run instead of the database.
    pub test_scenario: Option<TestScenario>,
    /// Strategy implementation.
    pub strategy: StrategyKind,
    /// Number of levels per side in snapshots.
    pub book_depth: usize,
    /// Handling of unfilled limit remainders.
    pub limit_policy: LimitPolicy,
    /// Stop after this many scheduler events.
    pub max_events: Option<u64>,
    /// Rows fetched per database round trip.
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: "ES".to_string(),
            db_path: None,
            tick_size: 0.25,
            tick_value: 12.50,
            capital: 100_000.0,
            commission: 2.50,
            latency_data_signal_us: 100,
            latency_signal_order_us: 500,
            strategy_params: StrategyParams::new(),
            test_scenario: None,
            strategy: StrategyKind::default(),
            book_depth: 10,
            limit_policy: LimitPolicy::default(),
            max_events: None,
            batch_size: 50_000,
        }
    }
}

impl Config {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check every field that the core depends on.
    pub fn validate(&self) -> Result<()> {
        if !(self.tick_size > 0.0) {
            return Err(Error::config(format!(
                "tick_size must be positive, got {}",
                self.tick_size
            )));
        }
        if !(self.tick_value > 0.0) {
            return Err(Error::config(format!(
                "tick_value must be positive, got {}",
                self.tick_value
            )));
        }
        if self.commission < 0.0 {
            return Err(Error::config(format!(
                "commission must be non-negative, got {}",
                self.commission
            )));
        }
        if self.book_depth == 0 {
            return Err(Error::config("book_depth must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if self.test_scenario.is_none() && self.db_path.is_none() {
            return Err(Error::config("db_path is required when no test_scenario is set"));
        }
        self.data_signal_latency()?;
        self.signal_order_latency()?;
        Ok(())
    }

    /// Validated data-to-signal latency.
    pub fn data_signal_latency(&self) -> Result<Latency> {
        Latency::from_micros(self.latency_data_signal_us)
            .ok_or_else(|| Error::latency("latency_data_signal_us", self.latency_data_signal_us))
    }

    /// Validated signal-to-order latency.
    pub fn signal_order_latency(&self) -> Result<Latency> {
        Latency::from_micros(self.latency_signal_order_us)
            .ok_or_else(|| Error::latency("latency_signal_order_us", self.latency_signal_order_us))
    }

    /// Convert an instrument price to the nearest tick count.
    #[inline]
    pub fn price_to_ticks(&self, price: f64) -> PriceTicks {
        (price / self.tick_size).round() as PriceTicks
    }

    /// Convert a (possibly fractional) tick count to an instrument price.
    #[inline]
    pub fn ticks_to_price(&self, ticks: f64) -> f64 {
        ticks * self.tick_size
    }

    /// Config for a synthetic scenario with the remaining fields defaulted.
    pub fn for_scenario(scenario: TestScenario) -> Self {
        Self {
            test_scenario: Some(scenario),
            ..Default::default()
        }
    }
}
