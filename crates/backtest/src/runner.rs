//! Backtest run driver.
//!
//! Pulls raw book events lazily from the source and drives everything off
//! [`EventScheduler::pop_next`]:
//!
//! - book event: apply to the engine; an Execute also offers its trade to
//!   resting limits on that side. On a top-of-book change mark the
//!   portfolio, match resting limits, and schedule market data after the
//!   data latency. Then pull the next raw event.
//! - market data: hand to the strategy, schedule its intents after the
//!   order latency.
//! - order: execute (or cancel) against the engine's current snapshot,
//!   schedule the fill with no delay.
//! - fill: book it in the portfolio, hand it to the strategy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use l3_book::OrderBookEngine;
use l3_core::{
    ts_to_datetime, BookError, Config, Error, Fill, FillStatus, L3BookEvent, Latency,
    MarketDataEvent, OrderBookSnapshot, OrderIntent, TimestampNs,
};
use l3_ingestion::{open_source, EventSource, IngestionStats};

use crate::execution::ExecutionSimulator;
use crate::metrics::{BacktestMetrics, MetricsCalculator};
use crate::portfolio::{ClosedTrade, Portfolio, PortfolioSummary};
use crate::scheduler::EventScheduler;
use crate::strategy::{build_strategy, Strategy};

/// Pops between progress log lines.
const PROGRESS_INTERVAL: u64 = 500_000;

/// Anything travelling through the run's timeline.
#[derive(Debug, Clone)]
enum Payload {
    Book(L3BookEvent),
    MarketData(MarketDataEvent),
    Order(OrderIntent),
    Fill(Fill),
}

/// Fatal stop of a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The book rejected an event. `last_good` is the book before it.
    #[error("{source} (event {event:?})")]
    Book {
        source: BookError,
        event: L3BookEvent,
        last_good: Box<OrderBookSnapshot>,
    },

    /// Configuration, data source or scheduling failure.
    #[error(transparent)]
    Run(#[from] Error),
}

impl RunError {
    /// The raw event that stopped the run, if a book error.
    pub fn event(&self) -> Option<&L3BookEvent> {
        match self {
            RunError::Book { event, .. } => Some(event),
            RunError::Run(_) => None,
        }
    }

    /// Book state before the offending event, if a book error.
    pub fn last_good_snapshot(&self) -> Option<&OrderBookSnapshot> {
        match self {
            RunError::Book { last_good, .. } => Some(&**last_good),
            RunError::Run(_) => None,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Scheduler pops processed.
    pub events_processed: u64,
    pub book_events: u64,
    pub market_data_events: u64,
    pub orders: u64,
    pub fills: u64,
    pub rejections: u64,
    /// Resting remainders withdrawn on request.
    pub cancels: u64,
    /// Stopped by `max_events` before the timeline drained.
    pub stopped_early: bool,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub symbol: String,
    /// Where the events came from.
    pub source: String,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub stats: RunStats,
    /// Raw events handed out by the source.
    pub ingestion: IngestionStats,
    /// Every fill delivered, rejections included, in delivery order.
    pub fills: Vec<Fill>,
    pub trades: Vec<ClosedTrade>,
    pub portfolio: PortfolioSummary,
    pub metrics: BacktestMetrics,
    /// Book at the end of the run.
    pub final_book: OrderBookSnapshot,
}

/// One backtest run.
pub struct Backtest {
    config: Config,
    source: Box<dyn EventSource>,
    strategy: Box<dyn Strategy>,
    engine: OrderBookEngine,
    scheduler: EventScheduler<Payload>,
    execution: ExecutionSimulator,
    portfolio: Portfolio,
    data_latency: Latency,
    order_latency: Latency,
    fills: Vec<Fill>,
    stats: RunStats,
    first_ts: Option<TimestampNs>,
}

impl Backtest {
    /// Validate `config` and wire up the source and strategy it selects.
    pub fn from_config(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let source = open_source(&config)?;
        let strategy = build_strategy(&config)?;
        Self::new(config, source, strategy)
    }

    /// Run with an explicit source and strategy.
    pub fn new(
        config: Config,
        source: Box<dyn EventSource>,
        strategy: Box<dyn Strategy>,
    ) -> Result<Self, Error> {
        let data_latency = config.data_signal_latency()?;
        let order_latency = config.signal_order_latency()?;

        Ok(Self {
            engine: OrderBookEngine::from_config(&config),
            execution: ExecutionSimulator::from_config(&config),
            portfolio: Portfolio::from_config(&config),
            scheduler: EventScheduler::new(),
            config,
            source,
            strategy,
            data_latency,
            order_latency,
            fills: Vec::new(),
            stats: RunStats::default(),
            first_ts: None,
        })
    }

    /// Drain the timeline and report.
    pub fn run(mut self) -> Result<BacktestReport, RunError> {
        info!(
            symbol = %self.config.symbol,
            source = %self.source.describe(),
            latency_data_signal_us = self.config.latency_data_signal_us,
            latency_signal_order_us = self.config.latency_signal_order_us,
            "starting backtest"
        );

        self.pull_book_event()?;

        while let Some(event) = self.scheduler.pop_next() {
            if let Some(max) = self.config.max_events {
                if self.stats.events_processed >= max {
                    info!(max_events = max, "event limit reached");
                    self.stats.stopped_early = true;
                    break;
                }
            }
            self.stats.events_processed += 1;

            let now = event.effective_ts();
            match event.payload {
                Payload::Book(book_event) => self.on_book_event(book_event, now)?,
                Payload::MarketData(md) => {
                    self.stats.market_data_events += 1;
                    let intents = self.strategy.on_market_data(&md);
                    self.submit(intents, now)?;
                }
                Payload::Order(intent) => self.on_order(intent, now)?,
                Payload::Fill(fill) => self.on_fill(fill, now)?,
            }

            if self.stats.events_processed % PROGRESS_INTERVAL == 0 {
                info!(
                    events = self.stats.events_processed,
                    book_events = self.stats.book_events,
                    fills = self.stats.fills,
                    ts = now,
                    "progress"
                );
            }
        }

        Ok(self.finish())
    }

    fn on_book_event(&mut self, event: L3BookEvent, now: TimestampNs) -> Result<(), RunError> {
        // The executed order is gone once applied.
        let trade = self.engine.trade_for(&event);
        let md = match self.engine.apply(&event) {
            Ok(md) => md,
            Err(source) => return Err(self.fatal(source, event)),
        };
        self.stats.book_events += 1;
        self.first_ts.get_or_insert(event.ts);

        if let Some(trade) = trade {
            for fill in self.execution.on_trade(&trade, now) {
                self.scheduler.schedule(Payload::Fill(fill), now, Latency::ZERO)?;
            }
        }

        if let Some(md) = md {
            self.portfolio.mark(&md.snapshot, now);
            for fill in self.execution.match_resting(&md.snapshot, now) {
                self.scheduler.schedule(Payload::Fill(fill), now, Latency::ZERO)?;
            }
            self.scheduler.schedule(Payload::MarketData(md), now, self.data_latency)?;
        }

        self.pull_book_event()
    }

    /// Schedule the next raw event, rejecting it if it goes back in time.
    fn pull_book_event(&mut self) -> Result<(), RunError> {
        let Some(next) = self.source.next_event()? else {
            return Ok(());
        };
        if let Err(source) = self.engine.check_in_order(next.ts) {
            return Err(self.fatal(source, next));
        }
        self.scheduler.schedule(Payload::Book(next), next.ts, Latency::ZERO)?;
        Ok(())
    }

    fn on_order(&mut self, intent: OrderIntent, now: TimestampNs) -> Result<(), RunError> {
        self.stats.orders += 1;
        let snapshot = self.engine.current_snapshot();
        let fill = match self.execution.execute(&intent, &snapshot, now) {
            Ok(fill) => fill,
            Err(e) => {
                warn!(intent_id = intent.id, error = %e, ts = now, "intent rejected");
                Fill::rejected(&intent, e.reject_reason(), now)
            }
        };
        self.scheduler.schedule(Payload::Fill(fill), now, Latency::ZERO)?;
        Ok(())
    }

    fn on_fill(&mut self, fill: Fill, now: TimestampNs) -> Result<(), RunError> {
        match fill.status {
            FillStatus::Rejected { .. } => self.stats.rejections += 1,
            FillStatus::Cancelled { .. } => self.stats.cancels += 1,
            _ => self.stats.fills += 1,
        }
        self.portfolio.on_fill(&fill);
        let intents = self.strategy.on_fill(&fill);
        self.fills.push(fill);
        self.submit(intents, now)
    }

    fn submit(&mut self, intents: Vec<OrderIntent>, now: TimestampNs) -> Result<(), RunError> {
        for intent in intents {
            self.scheduler.schedule(Payload::Order(intent), now, self.order_latency)?;
        }
        Ok(())
    }

    fn fatal(&self, source: BookError, event: L3BookEvent) -> RunError {
        let last_good = self.engine.current_snapshot();
        error!(
            error = %source,
            ts = event.ts,
            order_id = event.order_id,
            action = ?event.action,
            best_bid = ?last_good.best_bid().map(|l| l.price),
            best_ask = ?last_good.best_ask().map(|l| l.price),
            "fatal book error, stopping run"
        );
        RunError::Book {
            source,
            event,
            last_good: Box::new(last_good),
        }
    }

    fn finish(mut self) -> BacktestReport {
        if let Some(now) = self.scheduler.now() {
            self.portfolio.finish(now);
        }
        let metrics = MetricsCalculator::new(self.portfolio.initial_capital())
            .calculate(self.portfolio.trades(), self.portfolio.equity_curve());
        let portfolio = self.portfolio.summary();

        info!(
            events = self.stats.events_processed,
            book_events = self.stats.book_events,
            fills = self.stats.fills,
            rejections = self.stats.rejections,
            trades = metrics.total_trades,
            net_pnl = metrics.net_pnl,
            equity = portfolio.equity,
            "backtest finished"
        );

        BacktestReport {
            symbol: self.config.symbol.clone(),
            source: self.source.describe(),
            first_event_at: self.first_ts.map(ts_to_datetime),
            last_event_at: self.engine.last_ts().map(ts_to_datetime),
            stats: self.stats,
            ingestion: self.source.stats().clone(),
            fills: self.fills,
            trades: self.portfolio.trades().to_vec(),
            portfolio,
            metrics,
            final_book: self.engine.current_snapshot(),
        }
    }
}

/// Build and run the backtest `config` describes.
pub fn run_backtest(config: Config) -> Result<BacktestReport, RunError> {
    Backtest::from_config(config)?.run()
}
