//! # Page-table manager interface
//!
//! The page pool does not walk page tables itself. It consumes an
//! [`AddressSpace`]: something that can translate a virtual address to its
//! leaf entry, hand out the entry slot for a virtual address (creating
//! intermediate tables as needed), and swap a mapping.
//!
//! [`SoftPageTable`] is a software implementation over a `BTreeMap`, for
//! hosted runs and tests.

use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::page_entry_bits::PageEntryBits;
use alloc::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("{0} is not mapped")]
    NotMapped(VirtualAddress),
    #[error("{0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("{0} is outside the address space")]
    OutOfRange(VirtualAddress),
    #[error("out of memory for page-table pages")]
    OutOfMemory,
}

/// One address space, as seen by the page pool.
pub trait AddressSpace {
    /// Size of the valid range; user addresses are `0..size()`.
    fn size(&self) -> u64;

    /// Leaf entry for the page containing `va`, if one is valid.
    fn translate(&self, va: VirtualAddress) -> Option<PageEntryBits>;

    /// Entry slot for the page containing `va`, creating intermediate tables
    /// as required. The slot may hold an invalid entry.
    ///
    /// # Errors
    /// [`MapError::OutOfRange`] beyond [`size`](Self::size), or
    /// [`MapError::OutOfMemory`] if a table page cannot be allocated.
    fn walk_create(&mut self, va: VirtualAddress) -> Result<&mut PageEntryBits, MapError>;

    /// Drop any cached translation of `va` (TLB shootdown).
    fn invalidate(&mut self, _va: VirtualAddress) {}

    /// Replace the valid mapping of `va` with `entry`.
    ///
    /// The old entry is first made invalid and its translation flushed, so
    /// that the old and the new mapping are never visible at the same time.
    /// Nothing is modified if the first lookup fails. If the second lookup
    /// fails, the old entry is put back before the error is returned.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] if `va` has no valid mapping, or any error of
    /// [`walk_create`](Self::walk_create).
    fn remap(&mut self, va: VirtualAddress, entry: PageEntryBits) -> Result<(), MapError> {
        let va = va.page_base();
        let old = {
            let slot = self.walk_create(va)?;
            if !slot.valid() {
                return Err(MapError::NotMapped(va));
            }
            let old = *slot;
            slot.set_valid(false);
            old
        };
        self.invalidate(va);
        match self.walk_create(va) {
            Ok(slot) => *slot = entry,
            Err(err) => {
                if let Ok(slot) = self.walk_create(va) {
                    *slot = old;
                }
                return Err(err);
            }
        }
        self.invalidate(va);
        Ok(())
    }
}

/// Address space kept in a sorted map from page base to leaf entry.
#[derive(Debug, Clone)]
pub struct SoftPageTable {
    size: u64,
    entries: BTreeMap<u64, PageEntryBits>,
    /// Upper bound on entry slots; `walk_create` fails once it is reached.
    capacity: usize,
}

impl SoftPageTable {
    /// An empty address space covering `0..size`.
    #[must_use]
    pub const fn new(size: u64) -> Self {
        Self {
            size,
            entries: BTreeMap::new(),
            capacity: usize::MAX,
        }
    }

    /// Like [`new`](Self::new), but only `capacity` entry slots can ever be
    /// created, which simulates running out of page-table pages.
    #[must_use]
    pub const fn with_capacity(size: u64, capacity: usize) -> Self {
        Self {
            size,
            entries: BTreeMap::new(),
            capacity,
        }
    }

    /// Install a fresh mapping of `va` to `pa`.
    ///
    /// # Errors
    /// [`MapError::AlreadyMapped`] if `va` already has a valid entry, or any
    /// error of [`AddressSpace::walk_create`].
    pub fn map(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        let slot = self.walk_create(va)?;
        if slot.valid() {
            return Err(MapError::AlreadyMapped(va.page_base()));
        }
        *slot = flags.with_valid(true).with_physical_address(pa);
        Ok(())
    }

    /// Remove the mapping of `va`, returning the entry it had.
    pub fn unmap(&mut self, va: VirtualAddress) -> Option<PageEntryBits> {
        self.entries
            .remove(&va.page_base().as_u64())
            .filter(PageEntryBits::valid)
    }

    /// Valid mappings in ascending address order.
    pub fn mappings(&self) -> impl Iterator<Item = (VirtualAddress, PageEntryBits)> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| e.valid())
            .map(|(&va, &e)| (VirtualAddress::new(va), e))
    }
}

impl AddressSpace for SoftPageTable {
    fn size(&self) -> u64 {
        self.size
    }

    fn translate(&self, va: VirtualAddress) -> Option<PageEntryBits> {
        self.entries
            .get(&va.page_base().as_u64())
            .copied()
            .filter(PageEntryBits::valid)
    }

    fn walk_create(&mut self, va: VirtualAddress) -> Result<&mut PageEntryBits, MapError> {
        if va.as_u64() >= self.size {
            return Err(MapError::OutOfRange(va));
        }
        let key = va.page_base().as_u64();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            return Err(MapError::OutOfMemory);
        }
        Ok(self.entries.entry(key).or_insert_with(PageEntryBits::new))
    }
}
