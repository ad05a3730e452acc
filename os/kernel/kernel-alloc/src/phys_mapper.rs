//! # Frame memory
//!
//! Code can only touch memory through addresses it can dereference. In the
//! kernel that is the direct map of physical RAM; here the managed range is
//! backed by one pre-allocated arena of 4 KiB, 4 KiB-aligned cells, and a
//! physical address is turned into a cell by its frame slot.
//!
//! The arena itself does not arbitrate access. Whoever owns a frame (the pool
//! while it is free, the address spaces mapping it otherwise) decides who may
//! read or write it, which is why the accessors are `unsafe`.

use crate::addresses::PhysicalAddress;
use crate::layout::PhysLayout;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use kernel_info::memory::PAGE_SIZE;

/// Frame size as a slice length.
#[allow(clippy::cast_possible_truncation)]
pub const FRAME_BYTES: usize = PAGE_SIZE as usize;

/// Contents of one frame.
pub type FrameBytes = [u8; FRAME_BYTES];

#[repr(C, align(4096))]
struct FrameCell(UnsafeCell<FrameBytes>);

// Safety: access is coordinated by frame ownership, see the module docs.
unsafe impl Sync for FrameCell {}

pub(crate) struct PhysMemory {
    layout: PhysLayout,
    cells: Box<[FrameCell]>,
}

impl PhysMemory {
    /// Back every frame of `layout` with zeroed memory.
    pub(crate) fn new(layout: PhysLayout) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let frames = layout.frames() as usize;
        let mut cells = Vec::with_capacity(frames);
        cells.resize_with(frames, || FrameCell(UnsafeCell::new([0; FRAME_BYTES])));
        Self {
            layout,
            cells: cells.into_boxed_slice(),
        }
    }

    #[inline]
    fn cell(&self, pa: PhysicalAddress) -> &FrameCell {
        debug_assert!(self.layout.contains(pa));
        &self.cells[self.layout.slot(pa.frame())]
    }

    /// Read access to a managed frame.
    ///
    /// # Safety
    /// - `pa` must be a managed frame base.
    /// - Nobody may write the frame for the lifetime of the returned reference.
    #[inline]
    pub(crate) unsafe fn frame(&self, pa: PhysicalAddress) -> &FrameBytes {
        unsafe { &*self.cell(pa).0.get() }
    }

    /// Write access to a managed frame.
    ///
    /// # Safety
    /// - `pa` must be a managed frame base.
    /// - The caller must own the frame exclusively for the lifetime of the
    ///   returned reference.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn frame_mut(&self, pa: PhysicalAddress) -> &mut FrameBytes {
        unsafe { &mut *self.cell(pa).0.get() }
    }

    /// Overwrite a whole frame with `byte`.
    ///
    /// # Safety
    /// Same as [`frame_mut`](Self::frame_mut).
    pub(crate) unsafe fn fill(&self, pa: PhysicalAddress, byte: u8) {
        unsafe { self.frame_mut(pa) }.fill(byte);
    }

    /// Copy the contents of `src` into `dst`.
    ///
    /// # Safety
    /// - Both must be managed frame bases and distinct.
    /// - `src` must not be written and `dst` must be owned exclusively while
    ///   the copy runs.
    pub(crate) unsafe fn copy(&self, src: PhysicalAddress, dst: PhysicalAddress) {
        debug_assert_ne!(src, dst);
        let (from, to) = unsafe { (self.frame(src), self.frame_mut(dst)) };
        to.copy_from_slice(from);
    }
}
