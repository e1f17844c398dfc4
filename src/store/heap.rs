//! Index-tracking binary heap.
//!
//! # Responsibilities
//! - Keep the minimum element (by a caller-supplied comparator) at the root
//! - Record every element's current position in the element itself
//! - Restore heap order after the key of an element at *any* index changed
//!
//! # Design Decisions
//! - Array-backed, no allocation after construction unless `push` grows it
//! - `fix` sifts down first and only sifts up when the element did not move,
//!   so it is O(log n) from any position, not just the root

/// An element that records its own position inside an [`IndexedHeap`].
pub trait HeapSlot {
    /// Called by the heap every time the element lands on a new index.
    fn set_heap_index(&mut self, index: usize);
}

/// Position stamped on elements that were popped out of the heap.
pub const DETACHED: usize = usize::MAX;

/// Binary min-heap ordered by `less`, with per-element index tracking.
pub struct IndexedHeap<T> {
    items: Vec<T>,
    less: fn(&T, &T) -> bool,
}

impl<T: HeapSlot> IndexedHeap<T> {
    /// Build a heap from `items` in O(n).
    pub fn new(items: Vec<T>, less: fn(&T, &T) -> bool) -> Self {
        let mut heap = Self { items, less };
        for (index, item) in heap.items.iter_mut().enumerate() {
            item.set_heap_index(index);
        }
        let n = heap.items.len();
        for i in (0..n / 2).rev() {
            heap.down(i, n);
        }
        heap
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The minimum element.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Elements in heap (array) order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn push(&mut self, mut item: T) {
        let index = self.items.len();
        item.set_heap_index(index);
        self.items.push(item);
        self.up(index);
    }

    pub fn pop(&mut self) -> Option<T> {
        let last = self.items.len().checked_sub(1)?;
        self.swap(0, last);
        let mut item = self.items.pop()?;
        if !self.items.is_empty() {
            self.down(0, self.items.len());
        }
        item.set_heap_index(DETACHED);
        Some(item)
    }

    /// Re-establish heap order after the element at `index` changed its key.
    ///
    /// Returns `false` when `index` is out of range.
    pub fn fix(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        if !self.down(index, self.items.len()) {
            self.up(index);
        }
        true
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.items.swap(i, j);
        self.items[i].set_heap_index(i);
        self.items[j].set_heap_index(j);
    }

    fn up(&mut self, mut j: usize) {
        while j > 0 {
            let parent = (j - 1) / 2;
            if !(self.less)(&self.items[j], &self.items[parent]) {
                break;
            }
            self.swap(parent, j);
            j = parent;
        }
    }

    /// Sift down; true if the element moved.
    fn down(&mut self, start: usize, n: usize) -> bool {
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && (self.less)(&self.items[right], &self.items[left]) {
                child = right;
            }
            if !(self.less)(&self.items[child], &self.items[i]) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > start
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for IndexedHeap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
