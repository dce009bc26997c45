//! L3 order book reconstruction.
//!
//! [`OrderBookEngine`] owns every price level and the order-id index for the
//! lifetime of a run. Levels live in an arena; each side keeps a price-sorted
//! map of arena ids, and the index maps an exchange order id to
//! `(side, level id, slot)`. Nothing outside the engine holds references into
//! it: readers get [`OrderBookSnapshot`] values.
//!
//! Every event is validated completely before any state is touched, so a
//! rejected event leaves the book exactly as it was. The engine's snapshot
//! after an error is therefore the last-known-good state.

use std::collections::{BTreeMap, HashMap};

use l3_core::{
    BookError, BookLevel, BookSide, Config, L3Action, L3BookEvent, MalformedEvent, MarketDataEvent,
    OrderBookSnapshot, OrderId, PriceTicks, Quantity, TimestampNs, TopOfBook, Trade,
};
use tracing::trace;

use crate::level::{PriceLevel, RestingOrder, SlotIndex};

/// Arena index of a price level.
type LevelId = usize;

/// Where an order lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderLocator {
    side: BookSide,
    level: LevelId,
    slot: SlotIndex,
}

/// One side of the book: price -> arena id, iterated best first.
#[derive(Debug, Clone)]
struct Ladder {
    side: BookSide,
    /// Keyed by `-price` for bids and `price` for asks so that ascending
    /// iteration is always best first.
    levels: BTreeMap<PriceTicks, LevelId>,
}

impl Ladder {
    fn new(side: BookSide) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    #[inline]
    fn key(&self, price: PriceTicks) -> PriceTicks {
        match self.side {
            BookSide::Bid => -price,
            BookSide::Ask => price,
        }
    }

    fn get(&self, price: PriceTicks) -> Option<LevelId> {
        self.levels.get(&self.key(price)).copied()
    }

    fn insert(&mut self, price: PriceTicks, id: LevelId) {
        let key = self.key(price);
        self.levels.insert(key, id);
    }

    fn remove(&mut self, price: PriceTicks) -> Option<LevelId> {
        let key = self.key(price);
        self.levels.remove(&key)
    }

    fn best(&self) -> Option<LevelId> {
        self.levels.values().next().copied()
    }

    fn iter(&self) -> impl Iterator<Item = LevelId> + '_ {
        self.levels.values().copied()
    }

    fn len(&self) -> usize {
        self.levels.len()
    }
}

/// Reconstructs full depth from a stream of L3 events.
#[derive(Debug, Clone)]
pub struct OrderBookEngine {
    /// Snapshot depth horizon.
    depth: usize,
    /// Level arena; `None` entries are free.
    arena: Vec<Option<PriceLevel>>,
    /// Reusable arena slots.
    free: Vec<LevelId>,
    bids: Ladder,
    asks: Ladder,
    index: HashMap<OrderId, OrderLocator>,
    /// Timestamp of the last applied event.
    last_ts: Option<TimestampNs>,
    /// Top of book as last reported to consumers.
    reported_top: TopOfBook,
    events_applied: u64,
}

impl OrderBookEngine {
    /// Create an empty book reporting `depth` levels per side.
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            arena: Vec::new(),
            free: Vec::new(),
            bids: Ladder::new(BookSide::Bid),
            asks: Ladder::new(BookSide::Ask),
            index: HashMap::new(),
            last_ts: None,
            reported_top: TopOfBook::default(),
            events_applied: 0,
        }
    }

    /// Create an empty book using the configured depth horizon.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.book_depth)
    }

    /// Apply one raw event.
    ///
    /// Returns a [`MarketDataEvent`] only when the best bid or ask price or
    /// quantity changed. Any error is fatal for the run.
    pub fn apply(&mut self, event: &L3BookEvent) -> Result<Option<MarketDataEvent>, BookError> {
        self.check_in_order(event.ts)?;

        match event.action {
            L3Action::Add => self.apply_add(event)?,
            L3Action::Cancel => self.apply_cancel(event)?,
            L3Action::Modify => self.apply_modify(event)?,
            L3Action::Execute => self.apply_execute(event)?,
        }

        self.last_ts = Some(event.ts);
        self.events_applied += 1;
        debug_assert!(!self.is_crossed(), "validation let a cross through");

        trace!(
            ts = event.ts,
            action = ?event.action,
            order_id = event.order_id,
            price = event.price,
            quantity = event.quantity,
            "applied book event"
        );

        let top = self.top_of_book();
        if top == self.reported_top {
            return Ok(None);
        }
        self.reported_top = top;
        Ok(Some(MarketDataEvent {
            ts: event.ts,
            snapshot: self.snapshot(self.depth),
        }))
    }

    /// Reject timestamps earlier than the last applied event.
    pub fn check_in_order(&self, ts: TimestampNs) -> Result<(), BookError> {
        match self.last_ts {
            Some(last_ts) if ts < last_ts => Err(MalformedEvent::OutOfOrder { ts, last_ts }.into()),
            _ => Ok(()),
        }
    }

    fn apply_add(&mut self, event: &L3BookEvent) -> Result<(), BookError> {
        if event.quantity <= 0 {
            return Err(MalformedEvent::NonPositiveQuantity {
                order_id: event.order_id,
                quantity: event.quantity,
            }
            .into());
        }
        if self.index.contains_key(&event.order_id) {
            return Err(MalformedEvent::DuplicateOrderId {
                order_id: event.order_id,
            }
            .into());
        }
        self.check_would_cross(event.side, event.price)?;

        self.insert_order(event.side, event.price, event.order_id, event.quantity);
        Ok(())
    }

    fn apply_cancel(&mut self, event: &L3BookEvent) -> Result<(), BookError> {
        let locator = self.locate(event)?;
        self.remove_order(event.order_id, locator);
        Ok(())
    }

    fn apply_modify(&mut self, event: &L3BookEvent) -> Result<(), BookError> {
        let locator = self.locate(event)?;
        if event.quantity <= 0 {
            return Err(MalformedEvent::NonPositiveQuantity {
                order_id: event.order_id,
                quantity: event.quantity,
            }
            .into());
        }

        let (price, current) = self.order_at(locator);
        if event.price == price {
            if event.quantity == current {
                return Ok(());
            }
            if event.quantity < current {
                // Same-price decrease keeps queue priority.
                self.reduce_order(event.order_id, locator, current - event.quantity);
                return Ok(());
            }
        } else {
            self.check_would_cross(event.side, event.price)?;
        }

        // Price change or size increase: lose priority.
        self.remove_order(event.order_id, locator);
        self.insert_order(event.side, event.price, event.order_id, event.quantity);
        Ok(())
    }

    fn apply_execute(&mut self, event: &L3BookEvent) -> Result<(), BookError> {
        let locator = self.locate(event)?;
        if event.quantity <= 0 {
            return Err(MalformedEvent::NonPositiveQuantity {
                order_id: event.order_id,
                quantity: event.quantity,
            }
            .into());
        }

        let (_, resting) = self.order_at(locator);
        if event.quantity > resting {
            return Err(MalformedEvent::ExecuteExceedsResting {
                order_id: event.order_id,
                resting,
                executed: event.quantity,
            }
            .into());
        }

        if event.quantity == resting {
            self.remove_order(event.order_id, locator);
        } else {
            self.reduce_order(event.order_id, locator, event.quantity);
        }
        Ok(())
    }

    /// Resolve the order an event refers to and check its side.
    fn locate(&self, event: &L3BookEvent) -> Result<OrderLocator, BookError> {
        let locator = *self
            .index
            .get(&event.order_id)
            .ok_or(BookError::UnknownOrderReference {
                order_id: event.order_id,
            })?;
        if locator.side != event.side {
            return Err(MalformedEvent::SideMismatch {
                order_id: event.order_id,
            }
            .into());
        }
        Ok(locator)
    }

    /// Whether resting `price` on `side` would meet or pass the opposite best.
    fn check_would_cross(&self, side: BookSide, price: PriceTicks) -> Result<(), BookError> {
        let Some(opposite) = self.best_price(side.opposite()) else {
            return Ok(());
        };
        let (bid, ask) = match side {
            BookSide::Bid => (price, opposite),
            BookSide::Ask => (opposite, price),
        };
        if bid >= ask {
            return Err(BookError::CrossedBook { bid, ask });
        }
        Ok(())
    }

    fn order_at(&self, locator: OrderLocator) -> (PriceTicks, Quantity) {
        match self.arena[locator.level].as_ref() {
            Some(level) => (
                level.price(),
                level.get(locator.slot).map_or(0, |o| o.quantity),
            ),
            None => (0, 0),
        }
    }

    fn ladder_mut(&mut self, side: BookSide) -> &mut Ladder {
        match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        }
    }

    fn ladder(&self, side: BookSide) -> &Ladder {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    fn insert_order(
        &mut self,
        side: BookSide,
        price: PriceTicks,
        order_id: OrderId,
        quantity: Quantity,
    ) {
        let level_id = match self.ladder(side).get(price) {
            Some(id) => id,
            None => {
                let id = self.alloc_level(price);
                self.ladder_mut(side).insert(price, id);
                id
            }
        };
        let slot = match self.arena[level_id].as_mut() {
            Some(level) => level.push(RestingOrder { order_id, quantity }),
            None => unreachable!("ladder points at a free arena slot"),
        };
        let locator = OrderLocator {
            side,
            level: level_id,
            slot,
        };
        self.index.insert(order_id, locator);
    }

    fn reduce_order(&mut self, order_id: OrderId, locator: OrderLocator, by: Quantity) {
        if let Some(level) = self.arena[locator.level].as_mut() {
            let remaining = level.reduce(locator.slot, by);
            debug_assert!(
                matches!(remaining, Some(q) if q > 0),
                "order {order_id} reduced to zero"
            );
        }
    }

    /// Remove an order and its index entry together; drops the level if it empties.
    fn remove_order(&mut self, order_id: OrderId, locator: OrderLocator) {
        self.index.remove(&order_id);
        let Some(level) = self.arena[locator.level].as_mut() else {
            return;
        };
        level.remove(locator.slot);

        if level.is_empty() {
            let price = level.price();
            self.ladder_mut(locator.side).remove(price);
            self.free_level(locator.level);
        } else if level.needs_compaction() {
            for (moved_id, slot) in level.compact() {
                if let Some(entry) = self.index.get_mut(&moved_id) {
                    entry.slot = slot;
                }
            }
        }
    }

    fn alloc_level(&mut self, price: PriceTicks) -> LevelId {
        let level = PriceLevel::new(price);
        match self.free.pop() {
            Some(id) => {
                self.arena[id] = Some(level);
                id
            }
            None => {
                self.arena.push(Some(level));
                self.arena.len() - 1
            }
        }
    }

    fn free_level(&mut self, id: LevelId) {
        self.arena[id] = None;
        self.free.push(id);
    }

    fn level(&self, id: LevelId) -> Option<&PriceLevel> {
        self.arena.get(id).and_then(Option::as_ref)
    }

    fn best_price(&self, side: BookSide) -> Option<PriceTicks> {
        self.best(side).map(|l| l.price)
    }

    /// Best level on `side`.
    pub fn best(&self, side: BookSide) -> Option<BookLevel> {
        self.ladder(side)
            .best()
            .and_then(|id| self.level(id))
            .map(PriceLevel::to_book_level)
    }

    pub fn best_bid(&self) -> Option<BookLevel> {
        self.best(BookSide::Bid)
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.best(BookSide::Ask)
    }

    /// Up to `depth` levels per side, best first.
    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        OrderBookSnapshot {
            ts: self.last_ts.unwrap_or_default(),
            bids: self.depth_of(BookSide::Bid, depth),
            asks: self.depth_of(BookSide::Ask, depth),
        }
    }

    /// Snapshot at the configured depth horizon.
    pub fn current_snapshot(&self) -> OrderBookSnapshot {
        self.snapshot(self.depth)
    }

    fn depth_of(&self, side: BookSide, depth: usize) -> Vec<BookLevel> {
        self.ladder(side)
            .iter()
            .filter_map(|id| self.level(id))
            .take(depth)
            .map(PriceLevel::to_book_level)
            .collect()
    }

    /// Current best bid/ask as (price, quantity).
    pub fn top_of_book(&self) -> TopOfBook {
        TopOfBook {
            bid: self.best_bid().map(|l| (l.price, l.quantity)),
            ask: self.best_ask().map(|l| (l.price, l.quantity)),
        }
    }

    pub fn is_crossed(&self) -> bool {
        matches!(
            (self.best_price(BookSide::Bid), self.best_price(BookSide::Ask)),
            (Some(bid), Some(ask)) if bid >= ask
        )
    }

    /// Side, price and resting quantity of an order.
    pub fn order(&self, order_id: OrderId) -> Option<(BookSide, PriceTicks, Quantity)> {
        let locator = self.index.get(&order_id)?;
        let level = self.level(locator.level)?;
        let order = level.get(locator.slot)?;
        Some((locator.side, level.price(), order.quantity))
    }

    /// The trade an Execute event prints, priced at the resting order it hits.
    ///
    /// Must be called before the event is applied; `None` for other actions
    /// or an order the book does not hold.
    pub fn trade_for(&self, event: &L3BookEvent) -> Option<Trade> {
        if event.action != L3Action::Execute {
            return None;
        }
        let (side, price, _) = self.order(event.order_id)?;
        Some(Trade {
            ts: event.ts,
            side,
            price,
            quantity: event.quantity,
        })
    }

    /// Number of live orders ahead of `order_id` in its level's queue.
    pub fn queue_position(&self, order_id: OrderId) -> Option<usize> {
        let locator = self.index.get(&order_id)?;
        Some(self.level(locator.level)?.position_of(locator.slot))
    }

    /// Orders at one price in FIFO order.
    pub fn level_orders(&self, side: BookSide, price: PriceTicks) -> Vec<(OrderId, Quantity)> {
        self.ladder(side)
            .get(price)
            .and_then(|id| self.level(id))
            .map(|level| level.orders().map(|o| (o.order_id, o.quantity)).collect())
            .unwrap_or_default()
    }

    /// Number of resting orders on both sides.
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Number of price levels on one side.
    pub fn level_count(&self, side: BookSide) -> usize {
        self.ladder(side).len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn last_ts(&self) -> Option<TimestampNs> {
        self.last_ts
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }
}
