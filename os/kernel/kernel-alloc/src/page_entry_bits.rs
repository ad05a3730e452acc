use crate::addresses::PhysicalAddress;
use bitfield_struct::bitfield;
use kernel_info::memory::PAGE_SHIFT;

/// A single 64-bit leaf page-table entry in its raw bitfield form.
///
/// The layout follows RISC-V Sv39. The two software (RSW) bits are ignored
/// by hardware; bit 8 carries the copy-on-write marker.
///
/// ### Bit layout
///
/// | Bits   | Name  | Meaning |
/// |--------|-------|---------|
/// | 0      | `V`   | Valid (present) |
/// | 1      | `R`   | Readable |
/// | 2      | `W`   | Writable |
/// | 3      | `X`   | Executable |
/// | 4      | `U`   | User-mode accessible |
/// | 5      | `G`   | Global |
/// | 6      | `A`   | Accessed |
/// | 7      | `D`   | Dirty |
/// | 8      | `COW` | Copy-on-write (RSW) |
/// | 9      | RSW   | Reserved for software |
/// | 10–53  | `PPN` | Physical page number |
/// | 54–63  | –     | Reserved, must be zero |
///
/// ### Example
/// ```rust
/// # use kernel_alloc::{PageEntryBits, PhysicalAddress};
/// let e = PageEntryBits::user_rw(PhysicalAddress::new(0x8020_1000));
/// assert!(e.valid() && e.writable() && !e.cow());
/// assert_eq!(e.physical_address().as_u64(), 0x8020_1000);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Valid (V, bit 0). Clear entries fault on any access.
    pub valid: bool,
    /// Readable (R, bit 1).
    pub readable: bool,
    /// Writable (W, bit 2). Clear on shared copy-on-write pages.
    pub writable: bool,
    /// Executable (X, bit 3).
    pub executable: bool,
    /// User (U, bit 4). Accessible from user mode if set.
    pub user: bool,
    /// Global (G, bit 5).
    pub global: bool,
    /// Accessed (A, bit 6). Set by hardware.
    pub accessed: bool,
    /// Dirty (D, bit 7). Set by hardware on write.
    pub dirty: bool,
    /// Copy-on-write (RSW bit 8).
    ///
    /// Set together with a cleared `writable` bit on pages shared between
    /// address spaces; a write fault on such a page is resolved by the
    /// copy-on-write handler.
    pub cow: bool,
    /// Second software bit (RSW bit 9).
    pub software: bool,
    /// Physical page number (bits 10..=53).
    #[bits(44)]
    ppn: u64,
    #[bits(10)]
    __: u16,
}

impl PageEntryBits {
    #[inline]
    pub const fn set_physical_address(&mut self, pa: PhysicalAddress) {
        self.set_ppn(pa.as_u64() >> PAGE_SHIFT);
    }

    #[inline]
    #[must_use]
    pub const fn with_physical_address(mut self, pa: PhysicalAddress) -> Self {
        self.set_physical_address(pa);
        self
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.ppn() << PAGE_SHIFT)
    }

    /// A valid, user-accessible read/write data mapping of `pa`.
    #[inline]
    #[must_use]
    pub const fn user_rw(pa: PhysicalAddress) -> Self {
        Self::new()
            .with_valid(true)
            .with_readable(true)
            .with_writable(true)
            .with_user(true)
            .with_physical_address(pa)
    }

    /// Whether a write to this mapping must be resolved by the copy-on-write
    /// handler.
    #[inline]
    #[must_use]
    pub const fn is_cow(&self) -> bool {
        self.valid() && self.cow()
    }
}
