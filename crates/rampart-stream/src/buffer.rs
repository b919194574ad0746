//! Bounded, order-preserving event buffer

use std::collections::VecDeque;

/// Ring buffer that drops its oldest entry on overflow
#[derive(Debug, Clone)]
pub struct EventBuffer<M> {
    items: VecDeque<M>,
    capacity: usize,
    dropped: u64,
}

impl<M> EventBuffer<M> {
    /// Buffer holding at most `capacity` entries (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append; returns the entry dropped to make room
    pub fn push(&mut self, item: M) -> Option<M> {
        let dropped = if self.items.len() == self.capacity {
            self.dropped += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        dropped
    }

    /// Take every entry in arrival order
    pub fn drain(&mut self) -> Vec<M> {
        self.items.drain(..).collect()
    }

    /// Entries held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum entries
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped on overflow since creation
    #[inline]
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn overflow_keeps_most_recent() {
        let mut buffer = EventBuffer::new(3);
        for i in 1..=5 {
            buffer.push(i);
        }
        assert_eq!(buffer.dropped(), 2);
        assert_eq!(buffer.drain(), vec![3, 4, 5]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn push_reports_dropped_entry() {
        let mut buffer = EventBuffer::new(1);
        assert_eq!(buffer.push("a"), None);
        assert_eq!(buffer.push("b"), Some("a"));
    }

    proptest! {
        #[test]
        fn bounded_and_ordered(capacity in 1usize..16, items in proptest::collection::vec(any::<u32>(), 0..64)) {
            let mut buffer = EventBuffer::new(capacity);
            for item in &items {
                buffer.push(*item);
                prop_assert!(buffer.len() <= capacity);
            }
            let expected: Vec<u32> = items[items.len().saturating_sub(capacity)..].to_vec();
            prop_assert_eq!(buffer.drain(), expected);
        }
    }
}
