//! L3 replay backtester binary.
//!
//! Loads configuration, initializes tracing, runs one backtest and prints
//! the JSON report to stdout. Logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use l3_backtest::run_backtest;
use l3_core::{Config, TestScenario};

/// L3 order book replay backtester
#[derive(Parser, Debug)]
#[command(
    name = "l3-backtest",
    about = "Replay L3 order book events through a latency-aware backtest"
)]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(short, long, env = "L3_BACKTEST_CONFIG")]
    config: Option<PathBuf>,

    /// Run a synthetic scenario instead of reading the database.
    #[arg(long, value_parser = parse_scenario)]
    test_scenario: Option<TestScenario>,

    /// SQLite database with the `<symbol>_l3` table.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Instrument symbol.
    #[arg(long)]
    symbol: Option<String>,

    /// Stop after this many scheduler events.
    #[arg(long)]
    max_events: Option<u64>,

    /// Write the report here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit JSON logs.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn parse_scenario(s: &str) -> std::result::Result<TestScenario, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| {
            format!("unknown scenario '{s}' (long_target, long_stop, short_target, short_stop)")
        })
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        registry.with(layer).init();
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(std::io::stderr);
        registry.with(layer).init();
    }
}

fn load_config(args: &Args) -> Result<Config> {
    // Validated after the command-line overrides are applied.
    let mut config: Config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config from {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(scenario) = args.test_scenario {
        config.test_scenario = Some(scenario);
    }
    if let Some(db_path) = &args.db_path {
        config.db_path = Some(db_path.clone());
    }
    if let Some(symbol) = &args.symbol {
        config.symbol = symbol.clone();
    }
    if args.max_events.is_some() {
        config.max_events = args.max_events;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = load_config(&args)?;
    info!(
        symbol = %config.symbol,
        scenario = ?config.test_scenario.map(TestScenario::name),
        db_path = ?config.db_path,
        strategy = ?config.strategy,
        "starting l3-backtest"
    );

    let started = Utc::now();
    let report = match run_backtest(config) {
        Ok(report) => report,
        Err(err) => {
            if let Some(snapshot) = err.last_good_snapshot() {
                let book = serde_json::to_string_pretty(snapshot)?;
                error!(last_good_book = %book, "run aborted");
            }
            return Err(anyhow::Error::new(err).context("backtest failed"));
        }
    };
    let elapsed = Utc::now() - started;
    info!(elapsed_ms = elapsed.num_milliseconds(), "run complete");

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
