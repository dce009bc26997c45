//! Raw L3 event ingestion for the replay backtester.
//!
//! This crate handles:
//! - The pull-based event-source boundary
//! - Streaming events out of a per-symbol SQLite table
//! - Literal event streams for the synthetic test scenarios

pub mod scenario;
pub mod source;
pub mod sqlite;

pub use scenario::{scenario_events, scenario_source};
pub use source::{EventSource, IngestionStats, VecEventSource};
pub use sqlite::SqliteEventSource;

use l3_core::{Config, Error, Result};

/// Open the source selected by `config`: the test scenario if one is set,
/// otherwise the SQLite database at `db_path`.
pub fn open_source(config: &Config) -> Result<Box<dyn EventSource>> {
    if let Some(scenario) = config.test_scenario {
        return Ok(Box::new(scenario_source(scenario, config)));
    }
    let path = config
        .db_path
        .as_ref()
        .ok_or_else(|| Error::config("db_path is required when no test_scenario is set"))?;
    Ok(Box::new(SqliteEventSource::open(path, config)?))
}
