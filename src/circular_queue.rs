use std::collections::VecDeque;

/// Fixed-capacity history that evicts the oldest entry once full.
#[derive(Debug, Clone)]
pub struct CircularQueue<T> {
    deque: VecDeque<T>,
    capacity: usize,
}

impl<T> CircularQueue<T> {
    /// A zero capacity is bumped to one so the latest entry is always kept.
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        let capacity = cap.max(1);

        Self {
            deque: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the evicted entry, if any.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.deque.pop_back()
        } else {
            None
        };

        self.deque.push_front(item);

        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.deque.len() == self.capacity
    }

    /// Oldest first.
    #[inline]
    pub fn asc_iter(&self) -> impl Iterator<Item = &'_ T> {
        self.deque.iter().rev()
    }
}
