//! Bounded ring buffer of dispatched events, for `EventEngine::history()`.

use crate::event::Event;
use std::collections::VecDeque;

/// Fixed-capacity ring of the most recently dispatched events.
#[derive(Debug)]
pub struct EventHistory {
    capacity: usize,
    items: VecDeque<Event>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(event);
    }

    /// Most recent events last.
    pub fn snapshot(&self) -> Vec<Event> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, Priority};

    /// **Scenario**: pushing past capacity evicts the oldest entry.
    #[test]
    fn push_past_capacity_evicts_oldest() {
        let mut h = EventHistory::new(2);
        h.push(Event::new("a", EventPayload::SelfTick, Priority::Normal));
        h.push(Event::new("b", EventPayload::SelfTick, Priority::Normal));
        h.push(Event::new("c", EventPayload::SelfTick, Priority::Normal));

        let ids: Vec<&str> = h.snapshot().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
