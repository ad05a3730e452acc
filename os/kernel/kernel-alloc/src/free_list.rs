//! Index-based free lists.
//!
//! A free frame's "next" link conceptually lives inside the frame. Instead of
//! overlaying a pointer on frame memory, the links live in one side table
//! ([`Links`]) indexed by frame slot. A slot's link is only read or written by
//! whoever holds the lock of the shard the frame currently sits on, and a
//! frame sits on at most one shard, so relaxed atomics are sufficient: the
//! shard lock provides the ordering.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

/// End-of-list marker.
const NIL: u32 = u32::MAX;

/// Per-frame "next free" links, shared by all shards.
pub(crate) struct Links {
    next: Box<[AtomicU32]>,
}

impl Links {
    pub(crate) fn new(slots: usize) -> Self {
        let next: Vec<AtomicU32> = (0..slots).map(|_| AtomicU32::new(NIL)).collect();
        Self {
            next: next.into_boxed_slice(),
        }
    }
}

/// A LIFO stack of free frame slots.
///
/// # Invariants
/// - Every slot reachable from `head` is free and appears exactly once.
/// - `len` equals the number of reachable slots.
pub(crate) struct FreeList {
    head: u32,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: NIL, len: 0 }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.head == NIL
    }

    pub(crate) fn push(&mut self, links: &Links, slot: usize) {
        debug_assert!(slot < links.next.len());
        links.next[slot].store(self.head, Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        {
            self.head = slot as u32;
        }
        self.len += 1;
    }

    pub(crate) fn pop(&mut self, links: &Links) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let slot = self.head as usize;
        self.head = links.next[slot].swap(NIL, Ordering::Relaxed);
        self.len -= 1;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_lifo_order() {
        let links = Links::new(4);
        let mut list = FreeList::new();
        for slot in [0, 2, 3] {
            list.push(&links, slot);
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.pop(&links), Some(3));
        assert_eq!(list.pop(&links), Some(2));
        assert_eq!(list.pop(&links), Some(0));
        assert_eq!(list.pop(&links), None);
        assert!(list.is_empty());
    }

    #[test]
    fn two_lists_share_one_link_table() {
        let links = Links::new(4);
        let mut a = FreeList::new();
        let mut b = FreeList::new();
        a.push(&links, 0);
        b.push(&links, 1);
        a.push(&links, 2);
        b.push(&links, 3);

        let slot = a.pop(&links).unwrap();
        b.push(&links, slot);

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 3);
        assert_eq!(b.pop(&links), Some(2));
        assert_eq!(b.pop(&links), Some(3));
        assert_eq!(b.pop(&links), Some(1));
        assert_eq!(a.pop(&links), Some(0));
    }
}
