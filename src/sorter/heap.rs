//! Binary min-heap over a caller-supplied comparator
//!
//! Used by the transaction sorter in place of a FIFO so that Kahn's
//! algorithm emits ready nodes in a deterministic order.

use std::cmp::Ordering;

/// Array-backed binary min-heap.
///
/// The smallest element according to `comparator` is always at index 0.
pub struct Heap<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    items: Vec<T>,
    comparator: F,
}

impl<T, F> Heap<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// Creates an empty heap ordered by `comparator`.
    pub fn new(comparator: F) -> Self {
        Self {
            items: Vec::new(),
            comparator,
        }
    }

    /// Creates an empty heap with room for `capacity` elements.
    pub fn with_capacity(capacity: usize, comparator: F) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            comparator,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the smallest element without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Inserts an element. O(log n).
    pub fn insert(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Removes and returns the smallest element, or `None` when empty. O(log n).
    pub fn remove_smallest(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let smallest = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        smallest
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.comparator)(&self.items[a], &self.items[b]) == Ordering::Less
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.less(index, parent) {
                break;
            }
            self.items.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}
