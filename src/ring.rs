//! Fixed-capacity circular queue backing the future and past bin windows.
//!
//! The ring owns a slot arena sized once at construction; pushing and popping
//! only move the head index and the length, so sliding the readout window never
//! reallocates. A push onto a full ring evicts the oldest element and hands it
//! back to the caller, which lets the writeout buffer recycle evicted bins.
//!
//! # Layout
//! ```text
//!  slots: [ e | f | . | . | a | b | c | d ]
//!                       ^head = 4, len = 6
//!  logical order: a b c d e f
//! ```

use std::iter::Chain;
use std::slice;

/// Bounded FIFO over a preallocated slot arena.
#[derive(Debug, Clone)]
pub struct BinRing<T> {
    slots: Vec<T>,
    head: usize,
    len: usize,
}

impl<T: Default> BinRing<T> {
    /// Create an empty ring able to hold `capacity` elements.
    ///
    /// A zero capacity is allowed; such a ring evicts every pushed element.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| T::default()).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of elements the ring holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of elements currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the ring stores nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the next push will evict.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    fn physical(&self, index: usize) -> usize {
        (self.head + index) % self.slots.len()
    }

    /// Append at the back. When full, the oldest element is evicted and returned.
    pub fn push_back(&mut self, item: T) -> Option<T> {
        if self.slots.is_empty() {
            return Some(item);
        }
        let evicted = if self.is_full() { self.pop_front() } else { None };
        let tail = self.physical(self.len);
        self.slots[tail] = item;
        self.len += 1;
        evicted
    }

    /// Remove and return the oldest element.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = std::mem::take(&mut self.slots[self.head]);
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        Some(item)
    }

    /// Remove and return the newest element.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let tail = self.physical(self.len - 1);
        self.len -= 1;
        Some(std::mem::take(&mut self.slots[tail]))
    }

    /// Element at logical position `index` (0 = oldest).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        (index < self.len).then(|| &self.slots[self.physical(index)])
    }

    /// Mutable element at logical position `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len {
            let slot = self.physical(index);
            Some(&mut self.slots[slot])
        } else {
            None
        }
    }

    /// Oldest element.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// Mutable oldest element.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(0)
    }

    /// Newest element.
    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|last| self.get(last))
    }

    /// Mutable newest element.
    pub fn back_mut(&mut self) -> Option<&mut T> {
        match self.len.checked_sub(1) {
            Some(last) => self.get_mut(last),
            None => None,
        }
    }

    /// The stored elements as two contiguous runs, oldest first.
    #[must_use]
    pub fn as_slices(&self) -> (&[T], &[T]) {
        let first_len = self.len.min(self.slots.len() - self.head);
        let first = &self.slots[self.head..self.head + first_len];
        let second = &self.slots[..self.len - first_len];
        (first, second)
    }

    /// Mutable counterpart of [`BinRing::as_slices`].
    pub fn as_mut_slices(&mut self) -> (&mut [T], &mut [T]) {
        let first_len = self.len.min(self.slots.len() - self.head);
        let second_len = self.len - first_len;
        let (wrapped, from_head) = self.slots.split_at_mut(self.head);
        (&mut from_head[..first_len], &mut wrapped[..second_len])
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> Chain<slice::Iter<'_, T>, slice::Iter<'_, T>> {
        let (first, second) = self.as_slices();
        first.iter().chain(second.iter())
    }

    /// Mutably iterate oldest to newest.
    pub fn iter_mut(&mut self) -> Chain<slice::IterMut<'_, T>, slice::IterMut<'_, T>> {
        let (first, second) = self.as_mut_slices();
        first.iter_mut().chain(second.iter_mut())
    }

    /// Remove every element, passing each to `sink` oldest first.
    pub fn drain_with(&mut self, mut sink: impl FnMut(T)) {
        while let Some(item) = self.pop_front() {
            sink(item);
        }
    }

    /// Change the capacity, preserving order.
    ///
    /// When the new capacity is smaller than the current length, elements are
    /// dropped from the front (`keep_newest`) or from the back (otherwise) and
    /// returned so the caller can recycle them.
    pub fn set_capacity(&mut self, capacity: usize, keep_newest: bool) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len);
        self.drain_with(|item| items.push(item));

        let overflow = items.len().saturating_sub(capacity);
        let dropped: Vec<T> = if keep_newest {
            items.drain(..overflow).collect()
        } else {
            items.split_off(items.len() - overflow)
        };

        *self = Self::with_capacity(capacity);
        for item in items {
            self.push_back(item);
        }
        dropped
    }
}
