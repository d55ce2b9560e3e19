use serde::Serialize;
use std::collections::VecDeque;

/// Capacity shared by revision history and arrival-interval buffers
pub const HISTORY_CAPACITY: usize = 20;

/// Fixed-capacity ordered buffer.
///
/// `push_front` treats the front as newest and evicts from the back;
/// `push_back` treats the back as newest and evicts from the front.
/// A buffer should only be used with one of the two.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    #[serde(skip)]
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Insert as newest at the front; returns the evicted oldest entry, if any.
    pub fn push_front(&mut self, value: T) -> Option<T> {
        self.items.push_front(value);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    /// Append as newest at the back; returns the evicted oldest entry, if any.
    pub fn push_back(&mut self, value: T) -> Option<T> {
        self.items.push_back(value);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
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

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T> Default for BoundedHistory<T> {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
