//! Index-based circular doubly linked lists.
//!
//! Every bucket owns one list. Nodes `0..nbuf` are buffers; node `nbuf + b`
//! is the sentinel of bucket `b`. A node's links are only touched while
//! holding the lock of the bucket the node is on, so relaxed atomics are
//! enough: the bucket lock orders the accesses.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU16, Ordering};

pub(crate) struct Ring {
    prev: Box<[AtomicU16]>,
    next: Box<[AtomicU16]>,
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn node(id: usize) -> u16 {
    id as u16
}

impl Ring {
    /// `nodes` self-linked nodes. `nodes` must fit in `u16`.
    pub(crate) fn new(nodes: usize) -> Self {
        let links = || -> Box<[AtomicU16]> {
            let v: Vec<_> = (0..nodes).map(|i| AtomicU16::new(node(i))).collect();
            v.into_boxed_slice()
        };
        Self {
            prev: links(),
            next: links(),
        }
    }

    #[inline]
    fn next(&self, id: usize) -> usize {
        usize::from(self.next[id].load(Ordering::Relaxed))
    }

    #[inline]
    fn prev(&self, id: usize) -> usize {
        usize::from(self.prev[id].load(Ordering::Relaxed))
    }

    #[inline]
    fn link(&self, from: usize, to: usize) {
        self.next[from].store(node(to), Ordering::Relaxed);
        self.prev[to].store(node(from), Ordering::Relaxed);
    }
}

/// One bucket's list, most recently linked buffer first.
///
/// Lives behind the bucket lock; holding `&mut Chain` is holding the lock.
pub(crate) struct Chain {
    sentinel: usize,
    len: usize,
}

impl Chain {
    pub(crate) const fn new(sentinel: usize) -> Self {
        Self { sentinel, len: 0 }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn push_front(&mut self, ring: &Ring, id: usize) {
        let first = ring.next(self.sentinel);
        ring.link(id, first);
        ring.link(self.sentinel, id);
        self.len += 1;
    }

    /// Unlink `id`, which must be on this chain.
    pub(crate) fn unlink(&mut self, ring: &Ring, id: usize) {
        debug_assert_ne!(id, self.sentinel);
        ring.link(ring.prev(id), ring.next(id));
        ring.link(id, id);
        self.len -= 1;
    }

    /// Buffers on this chain, head to tail.
    pub(crate) fn iter<'a>(&'a self, ring: &'a Ring) -> impl Iterator<Item = usize> + 'a {
        let sentinel = self.sentinel;
        let mut cur = ring.next(sentinel);
        core::iter::from_fn(move || {
            (cur != sentinel).then(|| {
                let id = cur;
                cur = ring.next(id);
                id
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(chain: &Chain, ring: &Ring) -> Vec<usize> {
        chain.iter(ring).collect()
    }

    #[test]
    fn push_front_keeps_most_recent_first() {
        let ring = Ring::new(6);
        let mut chain = Chain::new(5);
        for id in [0, 1, 2] {
            chain.push_front(&ring, id);
        }
        assert_eq!(ids(&chain, &ring), [2, 1, 0]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn unlink_from_the_middle_and_the_ends() {
        let ring = Ring::new(6);
        let mut chain = Chain::new(5);
        for id in [0, 1, 2, 3] {
            chain.push_front(&ring, id);
        }
        chain.unlink(&ring, 2);
        assert_eq!(ids(&chain, &ring), [3, 1, 0]);
        chain.unlink(&ring, 3);
        chain.unlink(&ring, 0);
        assert_eq!(ids(&chain, &ring), [1]);
        chain.unlink(&ring, 1);
        assert!(ids(&chain, &ring).is_empty());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn nodes_move_between_chains() {
        let ring = Ring::new(4);
        let mut a = Chain::new(2);
        let mut b = Chain::new(3);
        a.push_front(&ring, 0);
        a.push_front(&ring, 1);

        a.unlink(&ring, 0);
        b.push_front(&ring, 0);
        assert_eq!(ids(&a, &ring), [1]);
        assert_eq!(ids(&b, &ring), [0]);
    }
}
