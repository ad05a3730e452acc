//! # Memory Layout

/// Size of a physical page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

/// Maximum number of CPUs sharing the page pool.
pub const NCPU: usize = 8;

/// Where the kernel image is placed in physical memory.
pub const PHYS_LOAD: u64 = 0x8000_0000;

/// First address after the kernel image (text, data, BSS).
///
/// In a linked kernel this is the linker's `end` symbol; the default here
/// reserves 2 MiB for the image.
pub const KERNEL_END: u64 = PHYS_LOAD + 0x20_0000;

/// Top of managed physical memory (exclusive).
pub const PHYS_TOP: u64 = PHYS_LOAD + 128 * 1024 * 1024;

/// Byte pattern written over a frame when it is handed out.
pub const ALLOC_FILL: u8 = 0x05;

/// Byte pattern written over a frame when it is returned.
pub const FREE_FILL: u8 = 0x01;

/// Round `addr` up to the next page boundary.
#[inline]
#[must_use]
pub const fn page_round_up(addr: u64) -> u64 {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(NCPU > 0);
    assert!(KERNEL_END.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_TOP.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_TOP > KERNEL_END);
    assert!(ALLOC_FILL != FREE_FILL);
    assert!(ALLOC_FILL != 0 && FREE_FILL != 0);
};
