//! Execution simulator.
//!
//! Fills strategy intents against a book snapshot by walking the opposing
//! side best level first. The live book is never touched: depth consumed by
//! an immediate fill exists only inside that fill's result.
//!
//! Under [`LimitPolicy::Resting`] a limit remainder is kept here and filled
//! two ways:
//!
//! - aggressively, when a later snapshot shows opposing depth at or better
//!   than the limit. Depth taken this way, and the immediate part of a
//!   limit that went on to rest, goes into a claims ledger keyed by
//!   `(side, price)`; every later walk sees `visible - claimed` there.
//! - passively, from trades printed against its own side. The remainder
//!   queues behind the quantity visible at or better than its price when it
//!   started resting and fills once trades at its price have used that up,
//!   or at once when a trade prints through its price.

use std::collections::{HashMap, VecDeque};

use l3_core::{
    BookLevel, BookSide, Config, ExecError, Fill, FillStatus, IntentId, LevelFill, LimitPolicy,
    OrderBookSnapshot, OrderIntent, OrderType, PriceTicks, Quantity, TimestampNs, Trade,
};
use tracing::{debug, trace};

/// A limit remainder waiting for liquidity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestingIntent {
    pub intent: OrderIntent,
    /// Quantity still unfilled.
    pub remaining: Quantity,
    /// When the remainder started resting.
    pub since: TimestampNs,
    /// Estimated quantity queued ahead of the remainder on its own side.
    pub queue_ahead: Quantity,
}

impl RestingIntent {
    fn limit_price(&self) -> PriceTicks {
        // Only limit intents ever rest.
        self.intent.limit_price.unwrap_or_default()
    }

    fn book_side(&self) -> BookSide {
        self.intent.side.resting_book_side()
    }

    /// Quantity a trade on the remainder's own side fills, updating the
    /// queue estimate.
    fn take_from_trade(&mut self, trade: &Trade) -> Quantity {
        let side = self.book_side();
        let limit = self.limit_price();
        if trade.price == limit {
            let filled = (trade.quantity - self.queue_ahead).clamp(0, self.remaining);
            self.queue_ahead = (self.queue_ahead - trade.quantity).max(0);
            filled
        } else if side.at_or_better(trade.price, limit) {
            // Better-priced orders ahead of us traded.
            self.queue_ahead = (self.queue_ahead - trade.quantity).max(0);
            0
        } else {
            // Traded through our price: everything ahead is gone.
            self.queue_ahead = 0;
            self.remaining
        }
    }
}

/// Simulates fills against reconstructed depth.
#[derive(Debug, Clone)]
pub struct ExecutionSimulator {
    tick_size: f64,
    /// Commission per contract.
    commission: f64,
    policy: LimitPolicy,
    resting: VecDeque<RestingIntent>,
    claims: HashMap<(BookSide, PriceTicks), Quantity>,
}

impl ExecutionSimulator {
    pub fn new(tick_size: f64, commission: f64, policy: LimitPolicy) -> Self {
        Self {
            tick_size,
            commission,
            policy,
            resting: VecDeque::new(),
            claims: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tick_size, config.commission, config.limit_policy)
    }

    /// Resolve `intent` against `book`.
    ///
    /// Market intents take whatever depth is visible and report a shortfall
    /// as [`FillStatus::Partial`]. Limit intents only take levels at or better
    /// than their limit; the remainder is rejected or rests depending on the
    /// configured [`LimitPolicy`]. Cancel intents withdraw a resting
    /// remainder and answer with [`FillStatus::Cancelled`].
    pub fn execute(
        &mut self,
        intent: &OrderIntent,
        book: &OrderBookSnapshot,
        now: TimestampNs,
    ) -> Result<Fill, ExecError> {
        if intent.order_type == OrderType::Cancel {
            let withdrawn = self
                .cancel_resting(intent.id)
                .ok_or(ExecError::UnknownIntent {
                    intent_id: intent.id,
                })?;
            debug!(intent_id = intent.id, withdrawn, "resting intent cancelled");
            return Ok(Fill::cancelled(intent, withdrawn, now));
        }

        validate(intent)?;
        self.refresh_claims(book);

        let side = intent.side.opposing_book_side();
        let available = self.available(book, side);
        let limit = match intent.order_type {
            OrderType::Limit => intent.limit_price,
            _ => None,
        };
        let levels = walk(&available, side, intent.quantity, limit);
        let filled: Quantity = levels.iter().map(|l| l.quantity).sum();
        let shortfall = intent.quantity - filled;

        let status = match intent.order_type {
            OrderType::Market if filled == 0 => {
                return Err(ExecError::InsufficientLiquidity {
                    intent_id: intent.id,
                    side: intent.side,
                    requested: intent.quantity,
                });
            }
            OrderType::Market if shortfall > 0 => FillStatus::Partial { shortfall },
            OrderType::Limit if shortfall > 0 => match self.policy {
                LimitPolicy::FillOrKill => {
                    return Err(ExecError::FillOrKill {
                        intent_id: intent.id,
                        requested: intent.quantity,
                        available: filled,
                    });
                }
                LimitPolicy::Resting => {
                    // The resting remainder must not take this depth again.
                    self.claim(side, &levels);
                    let own_side = intent.side.resting_book_side();
                    let queue_ahead =
                        quantity_at_or_better(book, own_side, limit.unwrap_or_default());
                    self.resting.push_back(RestingIntent {
                        intent: intent.clone(),
                        remaining: shortfall,
                        since: now,
                        queue_ahead,
                    });
                    FillStatus::Resting { remaining: shortfall }
                }
            },
            _ => FillStatus::Filled,
        };

        let fill = self.make_fill(intent, levels, status, now);
        debug!(
            intent_id = intent.id,
            side = ?intent.side,
            quantity = fill.quantity,
            price = fill.price,
            status = ?fill.status,
            "intent executed"
        );
        Ok(fill)
    }

    /// Match resting limit remainders against a fresh snapshot, oldest first.
    ///
    /// Also shrinks each queue estimate to what is still visible ahead of it,
    /// which accounts for cancels in front of the remainder.
    pub fn match_resting(&mut self, book: &OrderBookSnapshot, now: TimestampNs) -> Vec<Fill> {
        if self.resting.is_empty() {
            return Vec::new();
        }
        self.refresh_claims(book);

        let mut fills = Vec::new();
        let mut still_resting = VecDeque::with_capacity(self.resting.len());
        let pending = std::mem::take(&mut self.resting);

        for mut order in pending {
            let visible_ahead = quantity_at_or_better(book, order.book_side(), order.limit_price());
            order.queue_ahead = order.queue_ahead.min(visible_ahead);

            let side = order.intent.side.opposing_book_side();
            let available = self.available(book, side);
            let levels = walk(&available, side, order.remaining, Some(order.limit_price()));
            if levels.is_empty() {
                still_resting.push_back(order);
                continue;
            }

            self.claim(side, &levels);
            let filled: Quantity = levels.iter().map(|l| l.quantity).sum();
            order.remaining -= filled;
            fills.push(self.make_fill(&order.intent, levels, status_of(&order), now));
            trace!(
                intent_id = order.intent.id,
                filled,
                remaining = order.remaining,
                "resting order matched"
            );

            if order.remaining > 0 {
                still_resting.push_back(order);
            }
        }

        self.resting = still_resting;
        fills
    }

    /// Fill resting remainders from a trade printed against their own side.
    ///
    /// Passive fills are priced at the limit and take no visible depth.
    pub fn on_trade(&mut self, trade: &Trade, now: TimestampNs) -> Vec<Fill> {
        let mut fills = Vec::new();
        let mut still_resting = VecDeque::with_capacity(self.resting.len());
        let pending = std::mem::take(&mut self.resting);

        for mut order in pending {
            if order.book_side() != trade.side {
                still_resting.push_back(order);
                continue;
            }

            let filled = order.take_from_trade(trade);
            if filled > 0 {
                order.remaining -= filled;
                let levels = vec![LevelFill {
                    price: order.limit_price(),
                    quantity: filled,
                }];
                fills.push(self.make_fill(&order.intent, levels, status_of(&order), now));
                trace!(
                    intent_id = order.intent.id,
                    filled,
                    trade_price = trade.price,
                    remaining = order.remaining,
                    "resting order filled passively"
                );
            }

            if order.remaining > 0 {
                still_resting.push_back(order);
            }
        }

        self.resting = still_resting;
        fills
    }

    /// Withdraw a resting remainder. Returns the unfilled quantity.
    pub fn cancel_resting(&mut self, intent_id: IntentId) -> Option<Quantity> {
        let pos = self.resting.iter().position(|r| r.intent.id == intent_id)?;
        self.resting.remove(pos).map(|r| r.remaining)
    }

    /// Resting remainders in match order.
    pub fn resting(&self) -> impl Iterator<Item = &RestingIntent> + '_ {
        self.resting.iter()
    }

    pub fn resting_count(&self) -> usize {
        self.resting.len()
    }

    /// Quantity at `(side, price)` already taken by resting limits.
    pub fn claimed(&self, side: BookSide, price: PriceTicks) -> Quantity {
        self.claims.get(&(side, price)).copied().unwrap_or(0)
    }

    fn claim(&mut self, side: BookSide, levels: &[LevelFill]) {
        for taken in levels {
            *self.claims.entry((side, taken.price)).or_insert(0) += taken.quantity;
        }
    }

    /// Clamp claims to visible quantity and drop claims on vanished levels.
    fn refresh_claims(&mut self, book: &OrderBookSnapshot) {
        self.claims.retain(|&(side, price), claimed| {
            match book.levels(side).iter().find(|l| l.price == price) {
                Some(level) => {
                    *claimed = (*claimed).min(level.quantity);
                    *claimed > 0
                }
                None => false,
            }
        });
    }

    /// Opposing levels net of claims, best first.
    fn available(&self, book: &OrderBookSnapshot, side: BookSide) -> Vec<BookLevel> {
        book.levels(side)
            .iter()
            .map(|level| BookLevel {
                quantity: level.quantity - self.claimed(side, level.price),
                ..*level
            })
            .filter(|level| level.quantity > 0)
            .collect()
    }

    fn make_fill(
        &self,
        intent: &OrderIntent,
        levels: Vec<LevelFill>,
        status: FillStatus,
        ts: TimestampNs,
    ) -> Fill {
        let quantity: Quantity = levels.iter().map(|l| l.quantity).sum();
        let notional: i64 = levels.iter().map(|l| l.price * l.quantity).sum();
        let avg_price_ticks = if quantity > 0 {
            notional as f64 / quantity as f64
        } else {
            0.0
        };

        Fill {
            intent_id: intent.id,
            side: intent.side,
            avg_price_ticks,
            price: avg_price_ticks * self.tick_size,
            quantity,
            commission: self.commission * quantity as f64,
            ts,
            status,
            levels,
        }
    }
}

fn status_of(order: &RestingIntent) -> FillStatus {
    if order.remaining == 0 {
        FillStatus::Filled
    } else {
        FillStatus::Resting {
            remaining: order.remaining,
        }
    }
}

/// Visible quantity on `side` at `price` or better.
fn quantity_at_or_better(book: &OrderBookSnapshot, side: BookSide, price: PriceTicks) -> Quantity {
    book.levels(side)
        .iter()
        .take_while(|level| side.at_or_better(level.price, price))
        .map(|level| level.quantity)
        .sum()
}

fn validate(intent: &OrderIntent) -> Result<(), ExecError> {
    if intent.quantity <= 0 {
        return Err(ExecError::InvalidIntent {
            intent_id: intent.id,
            reason: format!("quantity must be positive, got {}", intent.quantity),
        });
    }
    if intent.order_type == OrderType::Limit && intent.limit_price.is_none() {
        return Err(ExecError::InvalidIntent {
            intent_id: intent.id,
            reason: "limit intent without a limit price".to_string(),
        });
    }
    Ok(())
}

/// Take up to `quantity` from `levels`, best first, stopping at the first
/// level worse than `limit`.
fn walk(
    levels: &[BookLevel],
    side: BookSide,
    quantity: Quantity,
    limit: Option<PriceTicks>,
) -> Vec<LevelFill> {
    let mut remaining = quantity;
    let mut taken = Vec::new();
    for level in levels {
        if remaining == 0 {
            break;
        }
        if let Some(limit) = limit {
            if !side.at_or_better(level.price, limit) {
                break;
            }
        }
        let qty = remaining.min(level.quantity);
        taken.push(LevelFill {
            price: level.price,
            quantity: qty,
        });
        remaining -= qty;
    }
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use l3_core::{OrderSide, RejectReason};

    fn make_level(price: PriceTicks, quantity: Quantity) -> BookLevel {
        BookLevel {
            price,
            quantity,
            order_count: 1,
        }
    }

    fn make_book(
        bids: &[(PriceTicks, Quantity)],
        asks: &[(PriceTicks, Quantity)],
    ) -> OrderBookSnapshot {
        OrderBookSnapshot {
            ts: 0,
            bids: bids.iter().map(|&(p, q)| make_level(p, q)).collect(),
            asks: asks.iter().map(|&(p, q)| make_level(p, q)).collect(),
        }
    }

    fn make_sim(policy: LimitPolicy) -> ExecutionSimulator {
        ExecutionSimulator::new(0.25, 2.5, policy)
    }

    fn make_trade(side: BookSide, price: PriceTicks, quantity: Quantity) -> Trade {
        Trade {
            ts: 0,
            side,
            price,
            quantity,
        }
    }

    #[test]
    fn test_market_sell_walks_bids() {
        let mut sim = make_sim(LimitPolicy::Resting);
        // 100.00 x 5, 99.75 x 10
        let book = make_book(&[(400, 5), (399, 10)], &[(401, 5)]);
        let intent = OrderIntent::market(1, OrderSide::Sell, 12);

        let fill = sim.execute(&intent, &book, 7).unwrap();

        assert_eq!(fill.quantity, 12);
        assert_eq!(fill.status, FillStatus::Filled);
        assert_relative_eq!(fill.price, (5.0 * 100.00 + 7.0 * 99.75) / 12.0, epsilon = 1e-9);
        assert_relative_eq!(fill.commission, 30.0);
        assert_eq!(fill.ts, 7);

        let residual = book.with_consumed(BookSide::Bid, &fill.levels);
        assert_eq!(residual.bids, vec![make_level(399, 3)]);
        // The input snapshot is untouched.
        assert_eq!(book.bids[0].quantity, 5);
    }

    #[test]
    fn test_market_partial_fill_reports_shortfall() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(400, 1)], &[(401, 3)]);
        let intent = OrderIntent::market(2, OrderSide::Buy, 5);
        let fill = sim.execute(&intent, &book, 0).unwrap();

        assert_eq!(fill.quantity, 3);
        assert_eq!(fill.status, FillStatus::Partial { shortfall: 2 });
        assert!(fill.is_partial());
    }

    #[test]
    fn test_empty_side_is_insufficient_liquidity() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(400, 1)], &[]);
        let intent = OrderIntent::market(3, OrderSide::Buy, 1);

        let err = sim.execute(&intent, &book, 0).unwrap_err();
        assert_eq!(err.reject_reason(), RejectReason::InsufficientLiquidity);
        assert_eq!(err.intent_id(), 3);
    }

    #[test]
    fn test_invalid_intents() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(400, 1)], &[(401, 1)]);

        let zero = OrderIntent::market(4, OrderSide::Buy, 0);
        assert!(matches!(sim.execute(&zero, &book, 0), Err(ExecError::InvalidIntent { .. })));

        let mut no_price = OrderIntent::limit(5, OrderSide::Buy, 1, 401);
        no_price.limit_price = None;
        assert!(matches!(
            sim.execute(&no_price, &book, 0),
            Err(ExecError::InvalidIntent { .. })
        ));
    }

    #[test]
    fn test_limit_stops_at_limit_price() {
        let mut sim = make_sim(LimitPolicy::FillOrKill);
        let book = make_book(&[(400, 5)], &[(401, 2), (402, 10)]);

        let ok = sim
            .execute(&OrderIntent::limit(6, OrderSide::Buy, 2, 401), &book, 0)
            .unwrap();
        assert_eq!(ok.status, FillStatus::Filled);
        assert_relative_eq!(ok.avg_price_ticks, 401.0);

        let err = sim
            .execute(&OrderIntent::limit(7, OrderSide::Buy, 3, 401), &book, 0)
            .unwrap_err();
        assert_eq!(
            err,
            ExecError::FillOrKill {
                intent_id: 7,
                requested: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_limit_remainder_rests_and_matches_later() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(398, 5)], &[(402, 10)]);

        let first = sim
            .execute(&OrderIntent::limit(8, OrderSide::Buy, 5, 401), &book, 10)
            .unwrap();
        assert_eq!(first.quantity, 0);
        assert_eq!(first.status, FillStatus::Resting { remaining: 5 });
        assert_eq!(sim.resting_count(), 1);

        // An offer appears at our limit.
        let moved = make_book(&[(398, 5)], &[(401, 2), (402, 10)]);
        let fills = sim.match_resting(&moved, 20);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, 2);
        assert_eq!(fills[0].ts, 20);
        assert_eq!(fills[0].status, FillStatus::Resting { remaining: 3 });
        assert_eq!(sim.claimed(BookSide::Ask, 401), 2);

        // Same visible depth: nothing left to take at 401.
        assert!(sim.match_resting(&moved, 30).is_empty());

        // An immediate intent sees depth net of the claim.
        let taker = sim
            .execute(&OrderIntent::market(9, OrderSide::Buy, 1), &moved, 40)
            .unwrap();
        assert_relative_eq!(taker.avg_price_ticks, 402.0);
    }

    #[test]
    fn test_immediate_part_of_resting_limit_is_not_taken_twice() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(398, 5)], &[(401, 2)]);

        let first = sim
            .execute(&OrderIntent::limit(12, OrderSide::Buy, 5, 402), &book, 0)
            .unwrap();
        assert_eq!(first.quantity, 2);
        assert_eq!(first.status, FillStatus::Resting { remaining: 3 });
        assert_eq!(sim.claimed(BookSide::Ask, 401), 2);

        // Only the bid moved: the two offers at 401 are already ours.
        let bid_moved = make_book(&[(399, 5)], &[(401, 2)]);
        assert!(sim.match_resting(&bid_moved, 1).is_empty());

        // Fresh size at 402 fills the rest.
        let deeper = make_book(&[(399, 5)], &[(401, 2), (402, 4)]);
        let fills = sim.match_resting(&deeper, 2);
        assert_eq!(fills.len(), 1);
        let taken = LevelFill {
            price: 402,
            quantity: 3,
        };
        assert_eq!(fills[0].levels, vec![taken]);
        assert_eq!(fills[0].status, FillStatus::Filled);
        assert_eq!(first.quantity + fills[0].quantity, 5);
    }

    #[test]
    fn test_claims_clamped_and_dropped() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(398, 5)], &[(401, 4)]);
        sim.execute(&OrderIntent::limit(10, OrderSide::Buy, 10, 400), &book, 0)
            .unwrap();

        let improved = make_book(&[(398, 5)], &[(400, 4), (401, 4)]);
        let fills = sim.match_resting(&improved, 1);
        assert_eq!(fills[0].quantity, 4);
        assert_eq!(sim.claimed(BookSide::Ask, 400), 4);

        // Market traded through part of 400.
        let thinner = make_book(&[(398, 5)], &[(400, 1), (401, 4)]);
        assert!(sim.match_resting(&thinner, 2).is_empty());
        assert_eq!(sim.claimed(BookSide::Ask, 400), 1);

        // Level gone: claim dropped, fresh liquidity at 400 is usable again.
        let gone = make_book(&[(398, 5)], &[(401, 4)]);
        sim.match_resting(&gone, 3);
        assert_eq!(sim.claimed(BookSide::Ask, 400), 0);
        let refilled = make_book(&[(398, 5)], &[(400, 3), (401, 4)]);
        let fills = sim.match_resting(&refilled, 4);
        assert_eq!(fills[0].quantity, 3);
    }

    #[test]
    fn test_resting_bid_fills_after_queue_ahead_trades() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(400, 3)], &[(402, 5)]);
        let rested = sim
            .execute(&OrderIntent::limit(13, OrderSide::Buy, 2, 400), &book, 0)
            .unwrap();
        assert_eq!(rested.status, FillStatus::Resting { remaining: 2 });
        assert_eq!(sim.resting().next().unwrap().queue_ahead, 3);

        // Two of the three contracts ahead trade.
        assert!(sim.on_trade(&make_trade(BookSide::Bid, 400, 2), 1).is_empty());

        // The last one ahead plus one of ours.
        let fills = sim.on_trade(&make_trade(BookSide::Bid, 400, 2), 2);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, 1);
        assert_relative_eq!(fills[0].price, 100.0);
        assert_eq!(fills[0].status, FillStatus::Resting { remaining: 1 });
        assert_eq!(sim.claimed(BookSide::Ask, 402), 0);

        // A print below our bid means we were hit first.
        let fills = sim.on_trade(&make_trade(BookSide::Bid, 399, 1), 3);
        assert_eq!(fills[0].quantity, 1);
        assert_eq!(fills[0].status, FillStatus::Filled);
        assert_eq!(sim.resting_count(), 0);
    }

    #[test]
    fn test_resting_offer_queues_behind_better_prices() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(399, 5)], &[(401, 2), (402, 3)]);
        sim.execute(&OrderIntent::limit(14, OrderSide::Sell, 2, 402), &book, 0)
            .unwrap();
        assert_eq!(sim.resting().next().unwrap().queue_ahead, 5);

        // Bid-side prints never reach a resting offer.
        assert!(sim.on_trade(&make_trade(BookSide::Bid, 399, 5), 1).is_empty());

        assert!(sim.on_trade(&make_trade(BookSide::Ask, 401, 2), 2).is_empty());
        let fills = sim.on_trade(&make_trade(BookSide::Ask, 402, 4), 3);
        assert_eq!(fills[0].quantity, 1);
        assert_eq!(fills[0].side, OrderSide::Sell);
        assert_eq!(fills[0].status, FillStatus::Resting { remaining: 1 });
    }

    #[test]
    fn test_cancels_ahead_shrink_queue_estimate() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(400, 5)], &[(402, 5)]);
        sim.execute(&OrderIntent::limit(15, OrderSide::Buy, 1, 400), &book, 0)
            .unwrap();

        // Four of the five ahead cancelled.
        let thinner = make_book(&[(400, 1)], &[(402, 5)]);
        assert!(sim.match_resting(&thinner, 1).is_empty());
        assert_eq!(sim.resting().next().unwrap().queue_ahead, 1);

        let fills = sim.on_trade(&make_trade(BookSide::Bid, 400, 2), 2);
        assert_eq!(fills[0].quantity, 1);
        assert_eq!(fills[0].status, FillStatus::Filled);
    }

    #[test]
    fn test_cancel_resting() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(398, 5)], &[(401, 4)]);
        let fill = sim
            .execute(&OrderIntent::limit(11, OrderSide::Buy, 2, 399), &book, 0)
            .unwrap();
        assert_eq!(fill.quantity, 0);
        assert_eq!(fill.status, FillStatus::Resting { remaining: 2 });

        assert_eq!(sim.cancel_resting(11), Some(2));
        assert_eq!(sim.cancel_resting(11), None);
        assert_eq!(sim.resting_count(), 0);
    }

    #[test]
    fn test_cancel_intent_withdraws_remainder() {
        let mut sim = make_sim(LimitPolicy::Resting);
        let book = make_book(&[(398, 5)], &[(401, 4)]);
        sim.execute(&OrderIntent::limit(16, OrderSide::Buy, 3, 399), &book, 0)
            .unwrap();

        let cancel = OrderIntent::cancel(16, OrderSide::Buy);
        let fill = sim.execute(&cancel, &book, 5).unwrap();
        assert_eq!(fill.status, FillStatus::Cancelled { withdrawn: 3 });
        assert_eq!((fill.quantity, fill.ts), (0, 5));
        assert_eq!(sim.resting_count(), 0);

        let err = sim.execute(&cancel, &book, 6).unwrap_err();
        assert_eq!(err, ExecError::UnknownIntent { intent_id: 16 });
        assert_eq!(err.reject_reason(), RejectReason::UnknownIntent);
    }
}
