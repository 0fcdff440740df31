use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

/// Min-heap of work items keyed by due time, popped in due order.
///
/// Replaces scan-everything polling: a tick pops only the items whose
/// due time has passed and leaves the rest untouched. Ties break on the
/// item key so ordering stays deterministic.
#[derive(Clone, Debug)]
pub struct DueQueue<K: Ord> {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, K)>>,
}

impl<K: Ord> Default for DueQueue<K> {
    fn default() -> Self {
        Self { heap: BinaryHeap::new() }
    }
}

impl<K: Ord> DueQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, due_at: DateTime<Utc>, key: K) {
        self.heap.push(Reverse((due_at, key)));
    }

    /// Earliest due time currently queued, due or not.
    pub fn peek_due_at(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    /// Pop the next item only if its due time has passed.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, K)> {
        match self.heap.peek() {
            Some(Reverse((at, _))) if *at <= now => {
                self.heap.pop().map(|Reverse(entry)| entry)
            }
            _ => None,
        }
    }

    /// Drain every item due at or before `now`, in due order.
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<(DateTime<Utc>, K)> {
        let mut due = Vec::new();
        while let Some(entry) = self.pop_due(now) {
            due.push(entry);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::DueQueue;

    #[test]
    fn pops_in_due_order_and_only_when_due() {
        let now = Utc::now();
        let mut queue = DueQueue::new();
        queue.push(now + Duration::hours(2), "late");
        queue.push(now - Duration::hours(1), "overdue");
        queue.push(now, "on-time");

        assert_eq!(queue.peek_due_at(), Some(now - Duration::hours(1)));

        let due = queue.drain_due(now);
        let keys: Vec<_> = due.iter().map(|(_, key)| *key).collect();
        assert_eq!(keys, vec!["overdue", "on-time"]);

        // The future item stays queued.
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(now).is_none());
        assert!(queue.pop_due(now + Duration::hours(2)).is_some());
    }

    #[test]
    fn equal_due_times_break_ties_on_the_key() {
        let now = Utc::now();
        let mut queue = DueQueue::new();
        queue.push(now, "b");
        queue.push(now, "a");

        let due = queue.drain_due(now);
        let keys: Vec<_> = due.iter().map(|(_, key)| *key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
