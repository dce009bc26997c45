//! Strategy interface and the built-in strategies.
//!
//! The run driver calls a [`Strategy`] synchronously at each event's
//! effective time and schedules whatever intents it returns.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use l3_core::{
    Config, Error, Fill, IntentId, MarketDataEvent, OrderIntent, OrderSide, PriceTicks, Quantity,
    Result, StrategyKind,
};

/// A trading strategy.
pub trait Strategy {
    /// React to a delayed market data event.
    fn on_market_data(&mut self, event: &MarketDataEvent) -> Vec<OrderIntent>;

    /// React to a fill (or a zero-quantity rejection) for one of our intents.
    fn on_fill(&mut self, fill: &Fill) -> Vec<OrderIntent>;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn on_market_data(&mut self, event: &MarketDataEvent) -> Vec<OrderIntent> {
        (**self).on_market_data(event)
    }

    fn on_fill(&mut self, fill: &Fill) -> Vec<OrderIntent> {
        (**self).on_fill(fill)
    }
}

/// Build the strategy selected by `config`.
pub fn build_strategy(config: &Config) -> Result<Box<dyn Strategy>> {
    match config.strategy {
        StrategyKind::Bracket => {
            let params = BracketParams::from_config(config)?;
            Ok(Box::new(BracketStrategy::new(params)))
        }
        StrategyKind::Passive => Ok(Box::new(PassiveStrategy::default())),
    }
}

/// Trade direction of the bracket entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    fn entry_side(self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// Bracket strategy parameters, read from `strategy_params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BracketParams {
    /// Entry direction.
    pub direction: Direction,
    /// Contracts per entry.
    pub quantity: Quantity,
    /// Profit target distance from entry, in ticks.
    pub target_ticks: PriceTicks,
    /// Stop distance from entry, in ticks.
    pub stop_ticks: PriceTicks,
    /// Entries allowed over the run.
    pub max_round_trips: u32,
}

impl Default for BracketParams {
    fn default() -> Self {
        Self {
            direction: Direction::Long,
            quantity: 1,
            target_ticks: 20,
            stop_ticks: 10,
            max_round_trips: 1,
        }
    }
}

impl BracketParams {
    /// Parameters from `strategy_params`; a test scenario supplies the
    /// direction unless the params name one.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut map: serde_json::Map<String, serde_json::Value> =
            config.strategy_params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        if let Some(scenario) = config.test_scenario {
            let direction = if scenario.is_long() { "long" } else { "short" };
            map.entry("direction").or_insert_with(|| direction.into());
        }

        let params: BracketParams = serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| Error::config(format!("strategy_params: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        if self.quantity <= 0 {
            return Err(Error::config(format!(
                "strategy_params.quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.target_ticks <= 0 || self.stop_ticks <= 0 {
            return Err(Error::config(
                "strategy_params target_ticks and stop_ticks must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BracketState {
    Flat,
    Entering { intent_id: IntentId },
    Open {
        entry_ticks: f64,
        quantity: Quantity,
    },
    Exiting {
        intent_id: IntentId,
        entry_ticks: f64,
        quantity: Quantity,
    },
    Done,
}

/// Enters once at market on the first two-sided book, then exits at market
/// when the exit side touches the target or the stop.
///
/// Longs watch the best bid, shorts the best ask.
#[derive(Debug, Clone)]
pub struct BracketStrategy {
    params: BracketParams,
    state: BracketState,
    next_intent_id: IntentId,
    round_trips: u32,
}

impl BracketStrategy {
    pub fn new(params: BracketParams) -> Self {
        Self {
            params,
            state: BracketState::Flat,
            next_intent_id: 1,
            round_trips: 0,
        }
    }

    pub fn params(&self) -> &BracketParams {
        &self.params
    }

    /// Completed entry/exit cycles.
    pub fn round_trips(&self) -> u32 {
        self.round_trips
    }

    /// Whether a position is currently held.
    pub fn is_open(&self) -> bool {
        matches!(self.state, BracketState::Open { .. } | BracketState::Exiting { .. })
    }

    fn next_id(&mut self) -> IntentId {
        let id = self.next_intent_id;
        self.next_intent_id += 1;
        id
    }

    fn target(&self, entry_ticks: f64) -> f64 {
        entry_ticks + self.params.direction.sign() * self.params.target_ticks as f64
    }

    fn stop(&self, entry_ticks: f64) -> f64 {
        entry_ticks - self.params.direction.sign() * self.params.stop_ticks as f64
    }

    /// Whether `price` on the exit side has reached the target or the stop.
    fn exit_triggered(&self, entry_ticks: f64, price: PriceTicks) -> bool {
        let price = price as f64;
        let (target, stop) = (self.target(entry_ticks), self.stop(entry_ticks));
        match self.params.direction {
            Direction::Long => price >= target || price <= stop,
            Direction::Short => price <= target || price >= stop,
        }
    }
}

impl Strategy for BracketStrategy {
    fn on_market_data(&mut self, event: &MarketDataEvent) -> Vec<OrderIntent> {
        let snapshot = &event.snapshot;
        let can_enter = self.round_trips < self.params.max_round_trips && snapshot.is_two_sided();
        match self.state {
            BracketState::Flat if can_enter => {
                let id = self.next_id();
                self.state = BracketState::Entering { intent_id: id };
                info!(
                    intent_id = id,
                    direction = ?self.params.direction,
                    ts = event.ts,
                    "bracket entry"
                );
                let side = self.params.direction.entry_side();
                vec![OrderIntent::market(id, side, self.params.quantity)]
            }
            BracketState::Open { entry_ticks, quantity } => {
                let exit_level = match self.params.direction {
                    Direction::Long => snapshot.best_bid(),
                    Direction::Short => snapshot.best_ask(),
                };
                let Some(level) = exit_level else {
                    return Vec::new();
                };
                if !self.exit_triggered(entry_ticks, level.price) {
                    return Vec::new();
                }

                let id = self.next_id();
                self.state = BracketState::Exiting {
                    intent_id: id,
                    entry_ticks,
                    quantity,
                };
                info!(
                    intent_id = id,
                    price = level.price,
                    entry_ticks,
                    ts = event.ts,
                    "bracket exit triggered"
                );
                let side = self.params.direction.entry_side().opposite();
                vec![OrderIntent::market(id, side, quantity)]
            }
            _ => Vec::new(),
        }
    }

    fn on_fill(&mut self, fill: &Fill) -> Vec<OrderIntent> {
        match self.state {
            BracketState::Entering { intent_id } if intent_id == fill.intent_id => {
                self.state = if fill.quantity > 0 {
                    BracketState::Open {
                        entry_ticks: fill.avg_price_ticks,
                        quantity: fill.quantity,
                    }
                } else {
                    BracketState::Flat
                };
            }
            BracketState::Exiting {
                intent_id,
                entry_ticks,
                quantity,
            } if intent_id == fill.intent_id => {
                let left = quantity - fill.quantity;
                if left > 0 {
                    // Rejected or partial exit: retry on the next book update.
                    self.state = BracketState::Open {
                        entry_ticks,
                        quantity: left,
                    };
                } else {
                    self.round_trips += 1;
                    self.state = if self.round_trips < self.params.max_round_trips {
                        BracketState::Flat
                    } else {
                        BracketState::Done
                    };
                }
            }
            _ => {}
        }
        debug!(intent_id = fill.intent_id, state = ?self.state, "bracket state after fill");
        Vec::new()
    }
}

/// Observes the book and never trades.
#[derive(Debug, Clone, Default)]
pub struct PassiveStrategy {
    market_data_seen: u64,
    fills_seen: u64,
}

impl PassiveStrategy {
    pub fn market_data_seen(&self) -> u64 {
        self.market_data_seen
    }

    pub fn fills_seen(&self) -> u64 {
        self.fills_seen
    }
}

impl Strategy for PassiveStrategy {
    fn on_market_data(&mut self, _event: &MarketDataEvent) -> Vec<OrderIntent> {
        self.market_data_seen += 1;
        Vec::new()
    }

    fn on_fill(&mut self, _fill: &Fill) -> Vec<OrderIntent> {
        self.fills_seen += 1;
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l3_core::{BookLevel, FillStatus, OrderBookSnapshot, OrderType, RejectReason, TestScenario};

    fn make_md(ts: i64, bid: Option<PriceTicks>, ask: Option<PriceTicks>) -> MarketDataEvent {
        let level = |price| BookLevel {
            price,
            quantity: 10,
            order_count: 1,
        };
        MarketDataEvent {
            ts,
            snapshot: OrderBookSnapshot {
                ts,
                bids: bid.map(level).into_iter().collect(),
                asks: ask.map(level).into_iter().collect(),
            },
        }
    }

    fn make_fill(intent: &OrderIntent, avg_price_ticks: f64, quantity: Quantity) -> Fill {
        Fill {
            intent_id: intent.id,
            side: intent.side,
            avg_price_ticks,
            price: avg_price_ticks * 0.25,
            quantity,
            commission: 2.5 * quantity as f64,
            ts: 0,
            status: FillStatus::Filled,
            levels: Vec::new(),
        }
    }

    #[test]
    fn test_params_from_scenario() {
        let config = Config::for_scenario(TestScenario::ShortStop);
        let params = BracketParams::from_config(&config).unwrap();
        assert_eq!(params.direction, Direction::Short);
        assert_eq!(params.target_ticks, 20);
        assert_eq!(params.stop_ticks, 10);
    }

    #[test]
    fn test_params_override_and_reject_unknown() {
        let mut config = Config::for_scenario(TestScenario::LongTarget);
        config.strategy_params.insert("target_ticks".into(), 8.into());
        config.strategy_params.insert("quantity".into(), 3.into());
        let params = BracketParams::from_config(&config).unwrap();
        assert_eq!(params.direction, Direction::Long);
        assert_eq!(params.target_ticks, 8);
        assert_eq!(params.quantity, 3);

        config.strategy_params.insert("bogus".into(), 1.into());
        assert!(matches!(BracketParams::from_config(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_long_round_trip() {
        let mut strategy = BracketStrategy::new(BracketParams::default());

        // One-sided book: no entry yet.
        assert!(strategy.on_market_data(&make_md(1, Some(17_999), None)).is_empty());

        let entry = strategy.on_market_data(&make_md(2, Some(17_999), Some(18_000)));
        assert_eq!(entry.len(), 1);
        assert_eq!(entry[0].side, OrderSide::Buy);
        assert_eq!(entry[0].order_type, OrderType::Market);
        // Pending entry: no duplicate orders.
        assert!(strategy.on_market_data(&make_md(3, Some(17_999), Some(18_000))).is_empty());

        strategy.on_fill(&make_fill(&entry[0], 18_000.0, 1));
        assert!(strategy.is_open());

        assert!(strategy.on_market_data(&make_md(4, Some(18_019), Some(18_021))).is_empty());
        let exit = strategy.on_market_data(&make_md(5, Some(18_020), Some(18_021)));
        assert_eq!(exit.len(), 1);
        assert_eq!(exit[0].side, OrderSide::Sell);

        strategy.on_fill(&make_fill(&exit[0], 18_020.0, 1));
        assert_eq!(strategy.round_trips(), 1);
        assert!(!strategy.is_open());
        // Round trips exhausted.
        assert!(strategy.on_market_data(&make_md(6, Some(17_999), Some(18_000))).is_empty());
    }

    #[test]
    fn test_short_stop_watches_ask() {
        let params = BracketParams {
            direction: Direction::Short,
            ..BracketParams::default()
        };
        let mut strategy = BracketStrategy::new(params);

        let entry = strategy.on_market_data(&make_md(1, Some(18_000), Some(18_001)));
        assert_eq!(entry[0].side, OrderSide::Sell);
        strategy.on_fill(&make_fill(&entry[0], 18_000.0, 1));

        assert!(strategy.on_market_data(&make_md(2, Some(18_000), Some(18_009))).is_empty());
        let exit = strategy.on_market_data(&make_md(3, Some(18_000), Some(18_010)));
        assert_eq!(exit[0].side, OrderSide::Buy);
    }

    #[test]
    fn test_rejected_entry_returns_to_flat() {
        let mut strategy = BracketStrategy::new(BracketParams::default());
        let entry = strategy.on_market_data(&make_md(1, Some(17_999), Some(18_000)));
        strategy.on_fill(&Fill::rejected(&entry[0], RejectReason::InsufficientLiquidity, 2));

        assert!(!strategy.is_open());
        let retry = strategy.on_market_data(&make_md(3, Some(17_999), Some(18_000)));
        assert_eq!(retry.len(), 1);
        assert_ne!(retry[0].id, entry[0].id);
    }

    #[test]
    fn test_passive_never_trades() {
        let mut strategy = PassiveStrategy::default();
        assert!(strategy.on_market_data(&make_md(1, Some(1), Some(2))).is_empty());
        assert_eq!(strategy.market_data_seen(), 1);
    }

    #[test]
    fn test_build_strategy_from_config() {
        let mut config = Config::for_scenario(TestScenario::LongTarget);
        config.strategy = StrategyKind::Passive;
        let mut strategy = build_strategy(&config).unwrap();
        assert!(strategy.on_market_data(&make_md(1, Some(1), Some(2))).is_empty());
    }
}
