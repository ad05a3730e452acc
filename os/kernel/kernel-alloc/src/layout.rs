//! Managed physical memory range.

use crate::addresses::{FrameIndex, PhysicalAddress};
use kernel_info::memory::{KERNEL_END, PAGE_SIZE, PHYS_TOP, page_round_up};

/// The physical range `[kernel_end, phys_top)` owned by the page pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysLayout {
    /// First address after the kernel image. Rounded up to a page boundary
    /// when the layout is validated.
    pub kernel_end: u64,
    /// Top of managed memory (exclusive).
    pub phys_top: u64,
}

impl Default for PhysLayout {
    fn default() -> Self {
        Self {
            kernel_end: KERNEL_END,
            phys_top: PHYS_TOP,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("managed range {start:#x}..{end:#x} holds no whole frame")]
    EmptyRange { start: u64, end: u64 },
    #[error("managed range holds {0} frames, more than a frame slot can address")]
    TooManyFrames(u64),
    #[error("at least one CPU is required")]
    NoCpus,
}

impl PhysLayout {
    #[must_use]
    pub const fn new(kernel_end: u64, phys_top: u64) -> Self {
        Self {
            kernel_end,
            phys_top,
        }
    }

    /// A layout of exactly `frames` frames starting at `base` (page aligned).
    #[must_use]
    pub const fn with_frames(base: u64, frames: u64) -> Self {
        Self::new(base, base + frames * PAGE_SIZE)
    }

    /// Lowest managed frame address.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(page_round_up(self.kernel_end))
    }

    /// Number of whole frames in the managed range.
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> u64 {
        let start = page_round_up(self.kernel_end);
        if self.phys_top <= start {
            0
        } else {
            (self.phys_top - start) / PAGE_SIZE
        }
    }

    /// Whether `pa` is a frame base the pool may hand out or take back.
    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.is_page_aligned()
            && pa.as_u64() >= self.kernel_end
            && pa.as_u64() < self.phys_top
            && self.phys_top - pa.as_u64() >= PAGE_SIZE
    }

    /// Dense slot number of a managed frame, `0..frames()`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn slot(&self, frame: FrameIndex) -> usize {
        (frame.as_u64() - self.start().frame().as_u64()) as usize
    }

    /// Inverse of [`slot`](Self::slot).
    #[inline]
    #[must_use]
    pub(crate) const fn frame_at(&self, slot: usize) -> PhysicalAddress {
        FrameIndex::new(self.start().frame().as_u64() + slot as u64).base()
    }

    pub(crate) const fn validate(&self) -> Result<(), ConfigError> {
        let frames = self.frames();
        if frames == 0 {
            return Err(ConfigError::EmptyRange {
                start: self.kernel_end,
                end: self.phys_top,
            });
        }
        // Slot u32::MAX terminates free lists.
        if frames >= u32::MAX as u64 {
            return Err(ConfigError::TooManyFrames(frames));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaligned_kernel_end_is_rounded_up() {
        let l = PhysLayout::new(0x8000_0800, 0x8000_3000);
        assert_eq!(l.start(), PhysicalAddress::new(0x8000_1000));
        assert_eq!(l.frames(), 2);
        assert!(!l.contains(PhysicalAddress::new(0x8000_0000)));
        assert!(l.contains(PhysicalAddress::new(0x8000_2000)));
        assert!(!l.contains(PhysicalAddress::new(0x8000_3000)));
    }

    #[test]
    fn slots_are_dense_from_zero() {
        let l = PhysLayout::with_frames(0x10_0000, 4);
        let last = PhysicalAddress::new(0x10_3000);
        assert_eq!(l.slot(last.frame()), 3);
        assert_eq!(l.frame_at(3), last);
    }

    #[test]
    fn empty_range_is_rejected() {
        let l = PhysLayout::new(0x2000, 0x2000);
        assert!(matches!(l.validate(), Err(ConfigError::EmptyRange { .. })));
    }
}
