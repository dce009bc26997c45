//! The event-source boundary.
//!
//! The run driver pulls raw L3 events one at a time through [`EventSource`];
//! it never sees where they come from.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use l3_core::{L3Action, L3BookEvent, Result};

/// Counts of events handed out by a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    /// Total events yielded.
    pub total_events: u64,
    pub adds: u64,
    pub modifies: u64,
    pub cancels: u64,
    pub executes: u64,
}

impl IngestionStats {
    /// Record one yielded event.
    pub fn record(&mut self, event: &L3BookEvent) {
        self.total_events += 1;
        match event.action {
            L3Action::Add => self.adds += 1,
            L3Action::Modify => self.modifies += 1,
            L3Action::Cancel => self.cancels += 1,
            L3Action::Execute => self.executes += 1,
        }
    }
}

/// A pull-based stream of raw book events in origin-timestamp order.
pub trait EventSource {
    /// Next event, or `None` when the stream is exhausted.
    fn next_event(&mut self) -> Result<Option<L3BookEvent>>;

    /// Short description for logs.
    fn describe(&self) -> String;

    /// Counts of events yielded so far.
    fn stats(&self) -> &IngestionStats;
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn next_event(&mut self) -> Result<Option<L3BookEvent>> {
        (**self).next_event()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn stats(&self) -> &IngestionStats {
        (**self).stats()
    }
}

/// In-memory source over a literal event list.
#[derive(Debug, Clone, Default)]
pub struct VecEventSource {
    label: String,
    events: VecDeque<L3BookEvent>,
    stats: IngestionStats,
}

impl VecEventSource {
    pub fn new(label: impl Into<String>, events: Vec<L3BookEvent>) -> Self {
        Self {
            label: label.into(),
            events: events.into(),
            stats: IngestionStats::default(),
        }
    }

    /// Events not yet yielded.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for VecEventSource {
    fn next_event(&mut self) -> Result<Option<L3BookEvent>> {
        let event = self.events.pop_front();
        if let Some(event) = &event {
            self.stats.record(event);
        }
        Ok(event)
    }

    fn describe(&self) -> String {
        format!("literal:{}", self.label)
    }

    fn stats(&self) -> &IngestionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l3_core::BookSide;

    #[test]
    fn test_vec_source_yields_in_order() {
        let mut source = VecEventSource::new(
            "test",
            vec![
                L3BookEvent::add(1, 1, BookSide::Bid, 400, 5),
                L3BookEvent::cancel(2, 1, BookSide::Bid),
            ],
        );

        assert_eq!(source.next_event().unwrap().unwrap().ts, 1);
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.next_event().unwrap().unwrap().action, L3Action::Cancel);
        assert!(source.next_event().unwrap().is_none());

        let stats = source.stats();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.adds, 1);
        assert_eq!(stats.cancels, 1);
    }

    #[test]
    fn test_boxed_source() {
        let mut source: Box<dyn EventSource> = Box::new(VecEventSource::new("boxed", vec![]));
        assert!(source.next_event().unwrap().is_none());
        assert_eq!(source.describe(), "literal:boxed");
    }
}
