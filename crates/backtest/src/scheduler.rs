//! Simulation clock and event timeline.
//!
//! A single min-heap keyed by `(effective_ts, sequence)`. Sequence numbers
//! are handed out in scheduling order, so events that become effective at
//! the same instant are delivered in the order they were generated.
//! [`EventScheduler::pop_next`] is the only way time moves forward.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use l3_core::{Error, Latency, Result, TimestampNs};
use tracing::trace;

/// Timing header of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// When the event was generated.
    pub origin_ts: TimestampNs,
    /// When the event is delivered (`origin_ts + latency`).
    pub effective_ts: TimestampNs,
    /// Global scheduling order, used to break ties.
    pub sequence: u64,
}

/// A payload travelling through the timeline.
#[derive(Debug, Clone)]
pub struct SimEvent<P> {
    pub header: EventHeader,
    pub payload: P,
}

impl<P> SimEvent<P> {
    #[inline]
    pub fn effective_ts(&self) -> TimestampNs {
        self.header.effective_ts
    }
}

impl<P> PartialEq for SimEvent<P> {
    fn eq(&self, other: &Self) -> bool {
        self.header.effective_ts == other.header.effective_ts
            && self.header.sequence == other.header.sequence
    }
}

impl<P> Eq for SimEvent<P> {}

impl<P> Ord for SimEvent<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the earliest effective time, then lowest sequence
        other
            .header
            .effective_ts
            .cmp(&self.header.effective_ts)
            .then_with(|| other.header.sequence.cmp(&self.header.sequence))
    }
}

impl<P> PartialOrd for SimEvent<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single ordered timeline for a run.
#[derive(Debug)]
pub struct EventScheduler<P> {
    queue: BinaryHeap<SimEvent<P>>,
    next_sequence: u64,
    /// Effective time of the last popped event.
    now: Option<TimestampNs>,
    popped: u64,
}

impl<P> Default for EventScheduler<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EventScheduler<P> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_sequence: 0,
            now: None,
            popped: 0,
        }
    }

    /// Schedule `payload`, generated at `origin_ts`, for delivery after `latency`.
    ///
    /// Fails with [`Error::Causality`] if `origin_ts` is earlier than the
    /// effective time of the event currently being processed.
    pub fn schedule(
        &mut self,
        payload: P,
        origin_ts: TimestampNs,
        latency: Latency,
    ) -> Result<EventHeader> {
        if let Some(now) = self.now {
            if origin_ts < now {
                return Err(Error::Causality { origin_ts, now });
            }
        }

        let header = EventHeader {
            origin_ts,
            effective_ts: origin_ts.saturating_add(latency.as_nanos()),
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        trace!(
            origin_ts = header.origin_ts,
            effective_ts = header.effective_ts,
            sequence = header.sequence,
            "scheduled event"
        );
        self.queue.push(SimEvent { header, payload });
        Ok(header)
    }

    /// Remove and return the earliest event, advancing the clock to its
    /// effective time.
    pub fn pop_next(&mut self) -> Option<SimEvent<P>> {
        let event = self.queue.pop()?;
        self.now = Some(event.header.effective_ts);
        self.popped += 1;
        trace!(
            effective_ts = event.header.effective_ts,
            sequence = event.header.sequence,
            "popped event"
        );
        Some(event)
    }

    /// Header of the next event without removing it.
    pub fn peek(&self) -> Option<&EventHeader> {
        self.queue.peek().map(|e| &e.header)
    }

    /// Current simulation time, `None` before the first pop.
    #[inline]
    pub fn now(&self) -> Option<TimestampNs> {
        self.now
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of events delivered so far.
    #[inline]
    pub fn popped(&self) -> u64 {
        self.popped
    }
}
