//! Per-frame share counts for copy-on-write.
//!
//! One lock covers the whole table. Updates are O(1) and far rarer than
//! allocations, so contention on it stays low.

use alloc::boxed::Box;
use alloc::vec;
use kernel_sync::TicketLock;

/// Why a count update was refused. The count is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefFault {
    /// The frame has no owner (count 0).
    Unowned,
    /// The count is at its maximum.
    Saturated,
}

pub(crate) struct RefTable {
    counts: TicketLock<Box<[u16]>>,
}

impl RefTable {
    pub(crate) fn new(slots: usize) -> Self {
        Self {
            counts: TicketLock::new("kmem.ref", vec![0u16; slots].into_boxed_slice()),
        }
    }

    /// Set the count of a frame that was unowned to 1; returns the previous count.
    pub(crate) fn init(&self, slot: usize) -> u16 {
        let mut counts = self.counts.lock();
        core::mem::replace(&mut counts[slot], 1)
    }

    /// Add one share. Refuses to share a free frame or to overflow.
    pub(crate) fn increment(&self, slot: usize) -> Result<u16, RefFault> {
        let mut counts = self.counts.lock();
        match counts[slot] {
            0 => Err(RefFault::Unowned),
            u16::MAX => Err(RefFault::Saturated),
            n => {
                counts[slot] = n + 1;
                Ok(n + 1)
            }
        }
    }

    /// Drop one share. Refuses to go below zero.
    pub(crate) fn decrement(&self, slot: usize) -> Result<u16, RefFault> {
        let mut counts = self.counts.lock();
        match counts[slot] {
            0 => Err(RefFault::Unowned),
            n => {
                counts[slot] = n - 1;
                Ok(n - 1)
            }
        }
    }

    /// Advisory read; may be stale by the time the caller acts on it.
    pub(crate) fn read(&self, slot: usize) -> u16 {
        self.counts.lock()[slot]
    }
}
