use std::collections::VecDeque;

/// Bounded FIFO that evicts its oldest entry when full.
///
/// Sits between capture and the transport: stale audio is worth less than
/// fresh audio, so overflow costs the oldest frame rather than the newest.
#[derive(Debug)]
pub struct FrameQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> FrameQueue<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append `item`, returning the evicted entry if the queue was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.dropped += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Put back an entry taken with `pop_front` that could not be delivered.
    /// Does not count as a drop and never evicts.
    pub fn restore_front(&mut self, item: T) {
        self.items.push_front(item);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted by overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
