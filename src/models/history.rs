// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Fixed-capacity rolling history of recent fixes.
//!
//! Data layout for a full buffer of capacity 5:
//!
//! ```text
//! [ d e a b c ]
//!       H
//! ```
//!
//! H marks the oldest element; iteration runs from H with index wraparound.
//! Appending to a full buffer overwrites the slot at H and advances it, so
//! eviction never shifts elements.

use crate::models::LocationFix;

/// Number of fixes kept for the live distance.
pub const HISTORY_CAPACITY: usize = 20;

/// Rolling history owned by an active run session.
pub type RunHistory = RingBuffer<LocationFix, HISTORY_CAPACITY>;

/// Append-only FIFO buffer holding at most `N` elements.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    slots: [Option<T>; N],
    /// Index of the oldest element
    head: usize,
    len: usize,
}

impl<T, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            head: 0,
            len: 0,
        }
    }

    /// Append an element, returning the evicted oldest one if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if N == 0 {
            return Some(item);
        }

        if self.len < N {
            let tail = (self.head + self.len) % N;
            self.slots[tail] = Some(item);
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head].replace(item);
            self.head = (self.head + 1) % N;
            evicted
        }
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % N].as_ref())
    }

    pub fn first(&self) -> Option<&T> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[(self.head + self.len - 1) % N].as_ref()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
