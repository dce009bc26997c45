//! Core data types for the L3 replay backtester.
//!
//! Prices are carried as integer tick counts everywhere inside the core; the
//! conversion to and from instrument prices lives on [`crate::Config`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp in nanoseconds since Unix epoch (UTC).
pub type TimestampNs = i64;

/// Price expressed as an integer number of ticks.
pub type PriceTicks = i64;

/// Quantity in contracts.
pub type Quantity = i64;

/// Exchange-assigned order id from the L3 feed.
pub type OrderId = u64;

/// Client-assigned id of a strategy order intent.
pub type IntentId = u64;

pub const NANOS_PER_MICRO: i64 = 1_000;

/// Convert a nanosecond timestamp to a UTC datetime.
#[inline]
pub fn ts_to_datetime(ts: TimestampNs) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ts)
}

/// A fixed propagation delay between two pipeline stages.
///
/// Always non-negative; construct through [`Latency::from_micros`] or
/// [`Latency::from_nanos`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Latency(i64);

impl Latency {
    pub const ZERO: Latency = Latency(0);

    /// Build a latency from microseconds. Returns `None` for negative input.
    pub fn from_micros(us: i64) -> Option<Self> {
        if us < 0 {
            return None;
        }
        us.checked_mul(NANOS_PER_MICRO).map(Latency)
    }

    /// Build a latency from nanoseconds. Returns `None` for negative input.
    pub fn from_nanos(ns: i64) -> Option<Self> {
        (ns >= 0).then_some(Latency(ns))
    }

    #[inline]
    pub fn as_nanos(self) -> i64 {
        self.0
    }
}

/// Side of the order book a resting order sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    /// The other side of the book.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            BookSide::Bid => BookSide::Ask,
            BookSide::Ask => BookSide::Bid,
        }
    }

    /// Whether `price` is at least as good as `reference` from this side's point of view.
    ///
    /// Higher is better for bids, lower is better for asks.
    #[inline]
    pub fn at_or_better(self, price: PriceTicks, reference: PriceTicks) -> bool {
        match self {
            BookSide::Bid => price >= reference,
            BookSide::Ask => price <= reference,
        }
    }
}

/// Direction of a strategy order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }

    /// The book side this order takes liquidity from.
    #[inline]
    pub fn opposing_book_side(self) -> BookSide {
        match self {
            OrderSide::Buy => BookSide::Ask,
            OrderSide::Sell => BookSide::Bid,
        }
    }

    /// The book side this order would rest on.
    #[inline]
    pub fn resting_book_side(self) -> BookSide {
        self.opposing_book_side().opposite()
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Kind of raw L3 book update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum L3Action {
    /// New order joins the tail of its price level.
    Add,
    /// Order changes price and/or quantity.
    Modify,
    /// Order leaves the book.
    Cancel,
    /// Order trades against an aggressor.
    Execute,
}

/// A raw exchange-level order book event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct L3BookEvent {
    /// Origin timestamp (ns).
    pub ts: TimestampNs,
    /// Update kind.
    pub action: L3Action,
    /// Exchange order id.
    pub order_id: OrderId,
    /// Book side of the order.
    pub side: BookSide,
    /// Price in ticks. For Cancel/Execute this is informational only.
    pub price: PriceTicks,
    /// Order quantity for Add/Modify, traded quantity for Execute.
    pub quantity: Quantity,
}

impl L3BookEvent {
    pub fn add(
        ts: TimestampNs,
        order_id: OrderId,
        side: BookSide,
        price: PriceTicks,
        quantity: Quantity,
    ) -> Self {
        Self {
            ts,
            action: L3Action::Add,
            order_id,
            side,
            price,
            quantity,
        }
    }

    pub fn modify(
        ts: TimestampNs,
        order_id: OrderId,
        side: BookSide,
        price: PriceTicks,
        quantity: Quantity,
    ) -> Self {
        Self {
            ts,
            action: L3Action::Modify,
            order_id,
            side,
            price,
            quantity,
        }
    }

    pub fn cancel(ts: TimestampNs, order_id: OrderId, side: BookSide) -> Self {
        Self {
            ts,
            action: L3Action::Cancel,
            order_id,
            side,
            price: 0,
            quantity: 0,
        }
    }

    pub fn execute(ts: TimestampNs, order_id: OrderId, side: BookSide, quantity: Quantity) -> Self {
        Self {
            ts,
            action: L3Action::Execute,
            order_id,
            side,
            price: 0,
            quantity,
        }
    }
}

/// A trade printed by the feed: an Execute against a resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub ts: TimestampNs,
    /// Side of the resting order that was hit.
    pub side: BookSide,
    /// Price of the resting order, in ticks.
    pub price: PriceTicks,
    pub quantity: Quantity,
}

/// Aggregated resting quantity at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Price in ticks.
    pub price: PriceTicks,
    /// Total resting quantity.
    pub quantity: Quantity,
    /// Number of resting orders.
    pub order_count: usize,
}

/// Immutable view of the book at a point in time.
///
/// Levels are ordered best first on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Timestamp of the last applied book event.
    pub ts: TimestampNs,
    /// Bid levels, highest price first.
    pub bids: Vec<BookLevel>,
    /// Ask levels, lowest price first.
    pub asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    #[inline]
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Levels of one side, best first.
    #[inline]
    pub fn levels(&self, side: BookSide) -> &[BookLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Mid price in (fractional) ticks.
    pub fn mid_ticks(&self) -> Option<f64> {
        let bid = self.best_bid()?.price as f64;
        let ask = self.best_ask()?.price as f64;
        Some((bid + ask) / 2.0)
    }

    /// Spread in ticks.
    pub fn spread_ticks(&self) -> Option<PriceTicks> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    /// Top-of-book summary used for change detection.
    pub fn top(&self) -> TopOfBook {
        TopOfBook {
            bid: self.best_bid().map(|l| (l.price, l.quantity)),
            ask: self.best_ask().map(|l| (l.price, l.quantity)),
        }
    }

    /// A copy of this snapshot with `consumed` removed from `side`.
    ///
    /// Levels that reach zero are dropped; the original snapshot is untouched.
    pub fn with_consumed(&self, side: BookSide, consumed: &[LevelFill]) -> Self {
        let mut out = self.clone();
        let levels = match side {
            BookSide::Bid => &mut out.bids,
            BookSide::Ask => &mut out.asks,
        };
        for taken in consumed {
            if let Some(level) = levels.iter_mut().find(|l| l.price == taken.price) {
                level.quantity -= taken.quantity;
            }
        }
        levels.retain(|l| l.quantity > 0);
        out
    }
}

/// Best bid and ask as (price, quantity) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopOfBook {
    pub bid: Option<(PriceTicks, Quantity)>,
    pub ask: Option<(PriceTicks, Quantity)>,
}

/// Market data derived from the reconstructed book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataEvent {
    /// Engine time at which the book changed.
    pub ts: TimestampNs,
    /// Book state after the change.
    pub snapshot: OrderBookSnapshot,
}

/// Order type of a strategy intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    /// Withdraw the resting remainder of intent `id`.
    Cancel,
}

/// A strategy-issued order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Client-assigned id.
    pub id: IntentId,
    /// Buy or sell.
    pub side: OrderSide,
    /// Requested quantity.
    pub quantity: Quantity,
    /// Market or limit.
    pub order_type: OrderType,
    /// Limit price in ticks (limit orders only).
    pub limit_price: Option<PriceTicks>,
}

impl OrderIntent {
    pub fn market(id: IntentId, side: OrderSide, quantity: Quantity) -> Self {
        Self {
            id,
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
        }
    }

    pub fn limit(
        id: IntentId,
        side: OrderSide,
        quantity: Quantity,
        limit_price: PriceTicks,
    ) -> Self {
        Self {
            id,
            side,
            quantity,
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
        }
    }

    /// Cancel request for the resting remainder of limit intent `id`.
    pub fn cancel(id: IntentId, side: OrderSide) -> Self {
        Self {
            id,
            side,
            quantity: 0,
            order_type: OrderType::Cancel,
            limit_price: None,
        }
    }
}

/// Quantity taken from one price level while resolving an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFill {
    pub price: PriceTicks,
    pub quantity: Quantity,
}

/// Why an intent produced no fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Opposing side had no usable depth.
    InsufficientLiquidity,
    /// Fill-or-kill limit could not be completed.
    FillOrKill,
    /// Intent was structurally invalid.
    InvalidIntent,
    /// Cancel referenced an intent with nothing resting.
    UnknownIntent,
}

/// Outcome attached to a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FillStatus {
    /// Requested quantity fully filled.
    Filled,
    /// Visible depth ran out; `shortfall` was not filled and is dropped.
    Partial { shortfall: Quantity },
    /// Limit remainder is resting in the simulator.
    Resting { remaining: Quantity },
    /// Resting remainder withdrawn on request.
    Cancelled { withdrawn: Quantity },
    /// Nothing filled.
    Rejected { reason: RejectReason },
}

/// Fill information for a simulated order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Intent this fill belongs to.
    pub intent_id: IntentId,
    /// Direction of the filled order.
    pub side: OrderSide,
    /// Volume-weighted fill price in ticks.
    pub avg_price_ticks: f64,
    /// Volume-weighted fill price in instrument units.
    pub price: f64,
    /// Filled quantity.
    pub quantity: Quantity,
    /// Commission charged (positive).
    pub commission: f64,
    /// Effective timestamp of the fill.
    pub ts: TimestampNs,
    /// Outcome flag.
    pub status: FillStatus,
    /// Depth consumed, best level first.
    pub levels: Vec<LevelFill>,
}

impl Fill {
    /// A zero-quantity fill reporting a rejected intent.
    pub fn rejected(intent: &OrderIntent, reason: RejectReason, ts: TimestampNs) -> Self {
        Self {
            intent_id: intent.id,
            side: intent.side,
            avg_price_ticks: 0.0,
            price: 0.0,
            quantity: 0,
            commission: 0.0,
            ts,
            status: FillStatus::Rejected { reason },
            levels: Vec::new(),
        }
    }

    /// A zero-quantity fill confirming a withdrawn remainder.
    pub fn cancelled(intent: &OrderIntent, withdrawn: Quantity, ts: TimestampNs) -> Self {
        Self {
            status: FillStatus::Cancelled { withdrawn },
            ..Self::rejected(intent, RejectReason::UnknownIntent, ts)
        }
    }

    #[inline]
    pub fn is_partial(&self) -> bool {
        matches!(self.status, FillStatus::Partial { .. })
    }

    #[inline]
    pub fn is_rejected(&self) -> bool {
        matches!(self.status, FillStatus::Rejected { .. })
    }

    /// Signed position change: positive for buys.
    #[inline]
    pub fn signed_quantity(&self) -> Quantity {
        self.quantity * self.side.sign()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_level(price: PriceTicks, quantity: Quantity) -> BookLevel {
        BookLevel {
            price,
            quantity,
            order_count: 1,
        }
    }

    #[test]
    fn test_latency_rejects_negative() {
        assert!(Latency::from_micros(-1).is_none());
        assert_eq!(Latency::from_micros(100).unwrap().as_nanos(), 100_000);
        assert_eq!(Latency::from_nanos(0), Some(Latency::ZERO));
    }

    #[test]
    fn test_order_side_mapping() {
        assert_eq!(OrderSide::Buy.opposing_book_side(), BookSide::Ask);
        assert_eq!(OrderSide::Sell.opposing_book_side(), BookSide::Bid);
        assert_eq!(OrderSide::Buy.resting_book_side(), BookSide::Bid);
        assert_eq!(OrderSide::Sell.sign(), -1);
    }

    #[test]
    fn test_at_or_better() {
        assert!(BookSide::Bid.at_or_better(401, 400));
        assert!(!BookSide::Bid.at_or_better(399, 400));
        assert!(BookSide::Ask.at_or_better(399, 400));
        assert!(BookSide::Ask.at_or_better(400, 400));
    }

    #[test]
    fn test_snapshot_mid_and_spread() {
        let snapshot = OrderBookSnapshot {
            ts: 0,
            bids: vec![make_level(400, 5)],
            asks: vec![make_level(402, 3)],
        };
        assert_eq!(snapshot.mid_ticks(), Some(401.0));
        assert_eq!(snapshot.spread_ticks(), Some(2));
        assert!(snapshot.is_two_sided());
    }

    #[test]
    fn test_with_consumed_leaves_original() {
        let snapshot = OrderBookSnapshot {
            ts: 0,
            bids: vec![make_level(400, 5), make_level(399, 10)],
            asks: vec![],
        };
        let consumed = [
            LevelFill {
                price: 400,
                quantity: 5,
            },
            LevelFill {
                price: 399,
                quantity: 7,
            },
        ];
        let after = snapshot.with_consumed(BookSide::Bid, &consumed);

        assert_eq!(after.bids, vec![make_level(399, 3)]);
        assert_eq!(snapshot.bids.len(), 2);
    }

    #[test]
    fn test_cancel_intent_and_fill() {
        let cancel = OrderIntent::cancel(4, OrderSide::Buy);
        assert_eq!(cancel.order_type, OrderType::Cancel);
        assert_eq!(cancel.quantity, 0);

        let fill = Fill::cancelled(&cancel, 3, 10);
        assert_eq!(fill.status, FillStatus::Cancelled { withdrawn: 3 });
        assert_eq!(fill.quantity, 0);
        assert!(!fill.is_rejected());
    }

    #[test]
    fn test_ts_to_datetime() {
        let dt = ts_to_datetime(1_704_067_200_000_000_000);
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }
}
