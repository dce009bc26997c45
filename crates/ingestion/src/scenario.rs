//! Synthetic L3 streams for the built-in test scenarios.
//!
//! Every scenario opens a two-sided book at t = 1s around 4500.00 and then,
//! at t = 2s, moves the touch far enough to trigger the bracket exit.

use l3_core::{BookSide, Config, L3BookEvent, PriceTicks, TestScenario, TimestampNs};

use crate::source::VecEventSource;

const T1: TimestampNs = 1_000_000_000;
const T2: TimestampNs = 2_000_000_000;

/// Quantity of every synthetic resting order.
const SIZE: i64 = 10;

/// Literal event sequence for `scenario`, priced with the config's tick size.
pub fn scenario_events(scenario: TestScenario, config: &Config) -> Vec<L3BookEvent> {
    let px = |price: f64| -> PriceTicks { config.price_to_ticks(price) };

    let mut events = if scenario.is_long() {
        // Long entries lift the 4500.00 offer.
        vec![
            L3BookEvent::add(T1, 1, BookSide::Bid, px(4499.75), SIZE),
            L3BookEvent::add(T1, 2, BookSide::Ask, px(4500.00), SIZE),
        ]
    } else {
        // Short entries hit the 4500.00 bid.
        vec![
            L3BookEvent::add(T1, 1, BookSide::Bid, px(4500.00), SIZE),
            L3BookEvent::add(T1, 2, BookSide::Ask, px(4500.25), SIZE),
        ]
    };

    let mut path = match scenario {
        TestScenario::LongTarget => vec![
            L3BookEvent::add(T2, 3, BookSide::Ask, px(4505.25), SIZE),
            L3BookEvent::cancel(T2, 2, BookSide::Ask),
            L3BookEvent::add(T2, 4, BookSide::Bid, px(4505.00), SIZE),
        ],
        TestScenario::LongStop => vec![
            L3BookEvent::add(T2, 3, BookSide::Bid, px(4497.50), SIZE),
            L3BookEvent::cancel(T2, 1, BookSide::Bid),
        ],
        TestScenario::ShortTarget => vec![
            L3BookEvent::add(T2, 3, BookSide::Bid, px(4494.75), SIZE),
            L3BookEvent::cancel(T2, 1, BookSide::Bid),
            L3BookEvent::add(T2, 4, BookSide::Ask, px(4495.00), SIZE),
        ],
        TestScenario::ShortStop => vec![
            L3BookEvent::add(T2, 3, BookSide::Ask, px(4502.50), SIZE),
            L3BookEvent::cancel(T2, 2, BookSide::Ask),
        ],
    };
    events.append(&mut path);
    events
}

/// Event source yielding the scenario stream.
pub fn scenario_source(scenario: TestScenario, config: &Config) -> VecEventSource {
    VecEventSource::new(scenario.name(), scenario_events(scenario, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::EventSource;
    use l3_core::L3Action;

    #[test]
    fn test_scenarios_are_time_ordered() {
        let config = Config::default();
        for scenario in [
            TestScenario::LongTarget,
            TestScenario::LongStop,
            TestScenario::ShortTarget,
            TestScenario::ShortStop,
        ] {
            let events = scenario_events(scenario, &config);
            assert!(events.windows(2).all(|w| w[0].ts <= w[1].ts), "{}", scenario.name());
            assert_eq!(events[0].ts, T1);
            assert_eq!(events.last().unwrap().ts, T2);
        }
    }

    #[test]
    fn test_long_target_prices() {
        let config = Config::default();
        let events = scenario_events(TestScenario::LongTarget, &config);

        assert_eq!(events[1].price, 18_000);
        assert_eq!(events[4].side, BookSide::Bid);
        assert_eq!(events[4].price, 18_020);
        assert_eq!(events[3].action, L3Action::Cancel);
    }

    #[test]
    fn test_scenario_source_label() {
        let config = Config::default();
        let source = scenario_source(TestScenario::ShortStop, &config);
        assert_eq!(source.remaining(), 4);
        assert_eq!(source.describe(), "literal:short_stop");
    }
}
