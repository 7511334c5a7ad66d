// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A bounded, reusable buffer for batches of edge events.

use crate::line::EdgeEvent;
use std::cmp::max;
use std::slice;

/// A user space buffer holding the events returned by one read.
///
/// The buffer is reused across reads: each refill starts from position
/// zero and discards whatever the previous read left behind, so events
/// from an earlier batch must not be retained across a refill.
#[derive(Debug)]
pub struct EventBatch {
    events: Vec<EdgeEvent>,
    capacity: usize,
}

impl EventBatch {
    /// Create a batch that can hold up to `capacity` events.
    pub fn new(capacity: usize) -> EventBatch {
        let capacity = max(capacity, 1);
        EventBatch {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// The maximum number of events one read can return.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of events present from the most recent read.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the most recent read returned no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop the previous batch contents in preparation for a refill.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Append an event to the batch being filled.
    ///
    /// Returns false, without storing the event, once the batch is full.
    pub fn push(&mut self, event: EdgeEvent) -> bool {
        if self.events.len() >= self.capacity {
            return false;
        }
        self.events.push(event);
        true
    }

    /// The events from the most recent read, in delivery order.
    pub fn iter(&self) -> slice::Iter<'_, EdgeEvent> {
        self.events.iter()
    }
}

impl<'a> IntoIterator for &'a EventBatch {
    type Item = &'a EdgeEvent;
    type IntoIter = slice::Iter<'a, EdgeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::EdgeKind;

    fn event(seqno: u32) -> EdgeEvent {
        EdgeEvent {
            timestamp_ns: seqno as u64 * 1000,
            kind: EdgeKind::Rising,
            offset: 23,
            seqno,
            line_seqno: seqno,
        }
    }

    #[test]
    fn capacity_is_bounded() {
        let mut batch = EventBatch::new(2);
        assert_eq!(batch.capacity(), 2);
        assert!(batch.push(event(1)));
        assert!(batch.push(event(2)));
        assert!(!batch.push(event(3)));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let batch = EventBatch::new(0);
        assert_eq!(batch.capacity(), 1);
    }

    #[test]
    fn refill_overwrites() {
        let mut batch = EventBatch::new(4);
        batch.push(event(1));
        batch.push(event(2));
        batch.clear();
        batch.push(event(3));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.iter().next().unwrap().seqno, 3);
    }

    #[test]
    fn iter_preserves_order() {
        let mut batch = EventBatch::new(4);
        batch.push(event(1));
        batch.push(event(2));
        batch.push(event(3));
        let seqnos: Vec<u32> = batch.iter().map(|e| e.seqno).collect();
        assert_eq!(seqnos, vec![1, 2, 3]);
    }
}
