//! A single price level: a dense FIFO of resting orders.
//!
//! Removed orders leave a tombstone so that the slot indices held by the
//! order-id index stay valid. Tombstones are squeezed out by [`PriceLevel::compact`]
//! once they dominate the slot vector, and the caller re-points the index
//! using the returned relocations.

use l3_core::{BookLevel, OrderId, PriceTicks, Quantity};

/// Position of an order inside a level's slot vector.
pub type SlotIndex = usize;

/// Minimum slot count before compaction is considered.
const COMPACT_MIN_SLOTS: usize = 32;

/// One resting exchange order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub quantity: Quantity,
}

/// All resting orders at one price on one side.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: PriceTicks,
    /// Sum of live order quantities.
    quantity: Quantity,
    /// Number of live (non-tombstoned) slots.
    live: usize,
    /// FIFO slots; `None` marks a removed order.
    slots: Vec<Option<RestingOrder>>,
    /// Index of the first slot that may be live.
    head: SlotIndex,
}

impl PriceLevel {
    pub fn new(price: PriceTicks) -> Self {
        Self {
            price,
            quantity: 0,
            live: 0,
            slots: Vec::new(),
            head: 0,
        }
    }

    #[inline]
    pub fn price(&self) -> PriceTicks {
        self.price
    }

    #[inline]
    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Aggregated view for snapshots.
    pub fn to_book_level(&self) -> BookLevel {
        BookLevel {
            price: self.price,
            quantity: self.quantity,
            order_count: self.live,
        }
    }

    /// Append an order at the tail of the queue.
    pub fn push(&mut self, order: RestingOrder) -> SlotIndex {
        debug_assert!(order.quantity > 0);
        self.quantity += order.quantity;
        self.live += 1;
        self.slots.push(Some(order));
        self.slots.len() - 1
    }

    /// Order stored at `slot`, if still live.
    #[inline]
    pub fn get(&self, slot: SlotIndex) -> Option<&RestingOrder> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Reduce the order at `slot` in place, keeping its queue position.
    ///
    /// Returns the remaining quantity, or `None` if the slot is a tombstone.
    /// The caller must have checked that `by` does not exceed the resting
    /// quantity.
    pub fn reduce(&mut self, slot: SlotIndex, by: Quantity) -> Option<Quantity> {
        let order = self.slots.get_mut(slot)?.as_mut()?;
        debug_assert!(by <= order.quantity);
        order.quantity -= by;
        self.quantity -= by;
        Some(order.quantity)
    }

    /// Tombstone the order at `slot`.
    pub fn remove(&mut self, slot: SlotIndex) -> Option<RestingOrder> {
        let order = self.slots.get_mut(slot)?.take()?;
        self.quantity -= order.quantity;
        self.live -= 1;
        while self.head < self.slots.len() && self.slots[self.head].is_none() {
            self.head += 1;
        }
        Some(order)
    }

    /// Whether tombstones outnumber live orders enough to warrant compaction.
    pub fn needs_compaction(&self) -> bool {
        self.slots.len() >= COMPACT_MIN_SLOTS && self.live * 2 < self.slots.len()
    }

    /// Drop tombstones, preserving FIFO order.
    ///
    /// Returns `(order_id, new_slot)` for every order whose slot changed.
    pub fn compact(&mut self) -> Vec<(OrderId, SlotIndex)> {
        let mut moved = Vec::new();
        let mut kept = Vec::with_capacity(self.live);
        for (old_slot, entry) in self.slots.drain(..).enumerate() {
            if let Some(order) = entry {
                let new_slot = kept.len();
                if new_slot != old_slot {
                    moved.push((order.order_id, new_slot));
                }
                kept.push(Some(order));
            }
        }
        self.slots = kept;
        self.head = 0;
        moved
    }

    /// Live orders in queue order.
    pub fn orders(&self) -> impl Iterator<Item = &RestingOrder> + '_ {
        self.slots[self.head..].iter().flatten()
    }

    /// Number of live orders ahead of `slot` in the queue.
    pub fn position_of(&self, slot: SlotIndex) -> usize {
        self.slots[self.head..slot.max(self.head)]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }
}
