//! # Per-CPU physical page pool
//!
//! Every CPU owns one free-list shard behind its own spin lock, so the common
//! allocate/free path of one CPU never contends with another.
//!
//! ```text
//!   CPU 0          CPU 1          CPU 2          CPU 3
//! ┌───────┐      ┌───────┐      ┌───────┐      ┌───────┐
//! │ shard │      │ shard │      │ shard │      │ shard │
//! └───┬───┘      └───┬───┘      └───┬───┘      └───┬───┘
//!     ▼              ▼              ▼              ▼
//!   frame          frame          (empty)        frame
//!     ▼              ▼                             ▼
//!   frame          frame                         frame
//! ```
//!
//! ## Allocation
//! Pop the local shard. If it is empty, release it and steal one frame from
//! the other shards, visiting CPUs `self+1, self+2, …` wrapping through 0, one
//! shard lock at a time. Since no path ever holds two shard locks, there is no
//! lock order to violate.
//!
//! ## Release
//! A frame is only returned to a shard when its share count drops to zero
//! ([`PagePool::decrement_and_maybe_release`]); [`PagePool::free`] is that same
//! path. Released frames go to the releasing CPU's shard.
//!
//! ## Poisoning
//! Allocated frames are filled with [`ALLOC_FILL`], released ones with
//! [`FREE_FILL`], so use of stale contents is visible on inspection.
//!
//! Both operations run pinned to one CPU via [`CpuPin`]; the shard chosen at
//! the start is the shard used at the end.

use crate::addresses::PhysicalAddress;
use crate::error::{AllocError, Fatal, fatal};
use crate::free_list::{FreeList, Links};
use crate::layout::{ConfigError, PhysLayout};
use crate::phys_mapper::{FrameBytes, PhysMemory};
use crate::refcount::{RefFault, RefTable};
use alloc::boxed::Box;
use alloc::vec::Vec;
use kernel_info::memory::{ALLOC_FILL, FREE_FILL};
use kernel_sync::{CpuLocal, CpuPin, SpinLock};
use log::{debug, info, warn};

/// Physical page allocator with copy-on-write share counts.
pub struct PagePool<C: CpuLocal> {
    layout: PhysLayout,
    cpu: C,
    shards: Box<[SpinLock<FreeList>]>,
    links: Links,
    refs: RefTable,
    memory: PhysMemory,
}

impl<C: CpuLocal> PagePool<C> {
    /// Build a pool over `layout` for `ncpu` CPUs.
    ///
    /// Every frame starts out owned (count 1) and is released once, which
    /// leaves the whole range on the constructing CPU's shard. Other CPUs
    /// fill their shards by stealing and freeing.
    ///
    /// # Errors
    /// An empty or oversized layout, or `ncpu == 0`.
    pub fn new(layout: PhysLayout, ncpu: usize, cpu: C) -> Result<Self, ConfigError> {
        if ncpu == 0 {
            return Err(ConfigError::NoCpus);
        }
        layout.validate()?;

        #[allow(clippy::cast_possible_truncation)]
        let frames = layout.frames() as usize;
        let shards: Vec<_> = (0..ncpu)
            .map(|_| SpinLock::new("kmem", FreeList::new()))
            .collect();

        let pool = Self {
            layout,
            cpu,
            shards: shards.into_boxed_slice(),
            links: Links::new(frames),
            refs: RefTable::new(frames),
            memory: PhysMemory::new(layout),
        };

        for slot in 0..frames {
            pool.refs.init(slot);
            pool.free(layout.frame_at(slot));
        }

        info!(
            "page pool: {frames} frames at {}..{:#x}, {ncpu} CPUs",
            layout.start(),
            layout.phys_top
        );
        Ok(pool)
    }

    #[inline]
    #[must_use]
    pub const fn layout(&self) -> &PhysLayout {
        &self.layout
    }

    #[inline]
    #[must_use]
    pub fn ncpu(&self) -> usize {
        self.shards.len()
    }

    /// Allocate one frame.
    ///
    /// The frame comes back with a share count of 1 and filled with
    /// [`ALLOC_FILL`]. `None` means every shard is empty.
    #[must_use]
    pub fn allocate(&self) -> Option<PhysicalAddress> {
        let slot = {
            let pin = CpuPin::new(&self.cpu);
            let id = self.checked_cpu(&pin);
            let local = self.shards[id].lock().pop(&self.links);
            local.or_else(|| self.steal(id))
        };

        let Some(slot) = slot else {
            warn!("page pool exhausted");
            return None;
        };

        let pa = self.layout.frame_at(slot);
        let previous = self.refs.init(slot);
        if previous != 0 {
            fatal(Fatal::AllocatedLiveFrame(pa));
        }
        // SAFETY: the frame just left the free lists; we are its only owner.
        unsafe { self.memory.fill(pa, ALLOC_FILL) };
        Some(pa)
    }

    /// Take one frame from another CPU's shard, never holding more than
    /// one shard lock.
    fn steal(&self, id: usize) -> Option<usize> {
        let ncpu = self.ncpu();
        (1..ncpu).map(|k| (id + k) % ncpu).find_map(|victim| {
            let slot = self.shards[victim].lock().pop(&self.links)?;
            debug!("cpu {id} stole frame slot {slot} from cpu {victim}");
            Some(slot)
        })
    }

    /// Return a frame. Equivalent to [`decrement_and_maybe_release`]: the frame
    /// only goes back to a shard once no address space references it.
    ///
    /// Freeing an address outside the managed range, or one that is not
    /// page-aligned, is fatal.
    ///
    /// [`decrement_and_maybe_release`]: Self::decrement_and_maybe_release
    pub fn free(&self, pa: PhysicalAddress) {
        self.decrement_and_maybe_release(pa);
    }

    /// Record one more owner of `pa`.
    ///
    /// # Errors
    /// [`AllocError::InvalidAddress`] if `pa` is misaligned or not managed.
    pub fn increment(&self, pa: PhysicalAddress) -> Result<u16, AllocError> {
        let slot = self.slot_of(pa).ok_or(AllocError::InvalidAddress(pa))?;
        match self.refs.increment(slot) {
            Ok(n) => Ok(n),
            Err(RefFault::Unowned) => fatal(Fatal::SharedFreeFrame(pa)),
            Err(RefFault::Saturated) => fatal(Fatal::RefCountOverflow(pa)),
        }
    }

    /// Drop one owner of `pa`; when none remain, poison the frame and put it
    /// on the calling CPU's shard. Returns whether the frame was released.
    pub fn decrement_and_maybe_release(&self, pa: PhysicalAddress) -> bool {
        let Some(slot) = self.slot_of(pa) else {
            fatal(Fatal::BadFree(pa));
        };
        match self.refs.decrement(slot) {
            Ok(0) => {
                self.release(slot, pa);
                true
            }
            Ok(_) => false,
            Err(_) => fatal(Fatal::NegativeRefCount(pa)),
        }
    }

    /// Current number of owners of `pa`. Advisory: another CPU may change it
    /// right after the read.
    ///
    /// # Errors
    /// [`AllocError::InvalidAddress`] if `pa` is misaligned or not managed.
    pub fn refcount(&self, pa: PhysicalAddress) -> Result<u16, AllocError> {
        let slot = self.slot_of(pa).ok_or(AllocError::InvalidAddress(pa))?;
        Ok(self.refs.read(slot))
    }

    fn release(&self, slot: usize, pa: PhysicalAddress) {
        // SAFETY: the count reached zero; no address space maps the frame.
        unsafe { self.memory.fill(pa, FREE_FILL) };
        let pin = CpuPin::new(&self.cpu);
        let id = self.checked_cpu(&pin);
        self.shards[id].lock().push(&self.links, slot);
    }

    /// Number of frames on all shards.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Number of frames on the shard of `cpu`.
    ///
    /// # Panics
    /// If `cpu` is not below [`ncpu`](Self::ncpu).
    #[must_use]
    pub fn shard_len(&self, cpu: usize) -> usize {
        self.shards[cpu].lock().len()
    }

    /// Read access to the contents of a managed frame.
    ///
    /// # Safety
    /// `pa` must be a managed frame base that nobody writes while the returned
    /// reference lives.
    #[must_use]
    pub unsafe fn frame(&self, pa: PhysicalAddress) -> &FrameBytes {
        assert!(self.layout.contains(pa), "{pa} is not a managed frame");
        unsafe { self.memory.frame(pa) }
    }

    /// Write access to the contents of a managed frame.
    ///
    /// # Safety
    /// The caller must hold the only writable mapping of `pa` (or otherwise
    /// own it exclusively) while the returned reference lives.
    #[must_use]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn frame_mut(&self, pa: PhysicalAddress) -> &mut FrameBytes {
        assert!(self.layout.contains(pa), "{pa} is not a managed frame");
        unsafe { self.memory.frame_mut(pa) }
    }

    /// Copy the contents of `src` into `dst`.
    ///
    /// # Safety
    /// See [`PhysMemory::copy`]; `src` must stay unwritten and `dst` owned
    /// exclusively for the duration of the copy.
    pub(crate) unsafe fn copy_frame(&self, src: PhysicalAddress, dst: PhysicalAddress) {
        unsafe { self.memory.copy(src, dst) }
    }

    fn slot_of(&self, pa: PhysicalAddress) -> Option<usize> {
        self.layout
            .contains(pa)
            .then(|| self.layout.slot(pa.frame()))
    }

    fn checked_cpu(&self, pin: &CpuPin<'_, C>) -> usize {
        let id = pin.id();
        if id >= self.ncpu() {
            fatal(Fatal::UnknownCpu {
                cpu: id,
                ncpu: self.ncpu(),
            });
        }
        id
    }
}
