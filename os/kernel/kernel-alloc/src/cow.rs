//! # Copy-on-write
//!
//! [`share_page`] is the fork-time half: the parent's frame is mapped into the
//! child, both entries lose write permission and carry the COW marker, and
//! the frame gains one owner.
//!
//! [`handle_cow_fault`] is the write-fault half:
//!
//! ```text
//!            write fault at va
//!                   │
//!         present, in range, COW? ── no ──▶ CowError::NotCow
//!                   │ yes
//!         owners of the frame?
//!           │              │
//!          == 1           > 1
//!           │              │
//!   set W, clear COW   allocate, copy, remap,
//!    (no allocation)   drop one owner of the old frame
//! ```

use crate::address_space::{AddressSpace, MapError};
use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::error::{AllocError, Fatal, fatal};
use crate::frame_alloc::PagePool;
use crate::page_entry_bits::PageEntryBits;
use kernel_sync::CpuLocal;
use log::trace;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CowError {
    /// Not present, outside the address space, or not marked copy-on-write.
    /// Some other fault policy has to deal with it.
    #[error("{0} is not a copy-on-write page")]
    NotCow(VirtualAddress),
    #[error("out of memory while copying a shared page")]
    OutOfMemory,
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// How a copy-on-write fault was resolved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CowOutcome {
    /// The faulting space was the only owner; its entry became writable.
    Upgraded,
    /// The page was shared; the faulting space now maps a private copy.
    Copied(PhysicalAddress),
}

/// Resolve a write fault at `va` in `aspace`.
///
/// # Errors
/// - [`CowError::NotCow`] if the page is not a copy-on-write page.
/// - [`CowError::OutOfMemory`] if a private copy was needed but the pool is
///   empty. The original mapping is left untouched.
///
/// A failing remap after the copy is fatal; the new frame is returned to the
/// pool first.
pub fn handle_cow_fault<C, A>(
    pool: &PagePool<C>,
    aspace: &mut A,
    va: VirtualAddress,
) -> Result<CowOutcome, CowError>
where
    C: CpuLocal,
    A: AddressSpace + ?Sized,
{
    let va = va.page_base();
    if va.as_u64() >= aspace.size() {
        return Err(CowError::NotCow(va));
    }
    let entry = match aspace.translate(va) {
        Some(entry) if entry.is_cow() => entry,
        _ => return Err(CowError::NotCow(va)),
    };

    let old = entry.physical_address();
    let owners = pool.refcount(old)?;
    if owners == 0 {
        fatal(Fatal::MappedFreeFrame(old));
    }

    let private = entry.with_writable(true).with_cow(false);

    if owners == 1 {
        *aspace.walk_create(va)? = private;
        aspace.invalidate(va);
        trace!("cow {va}: sole owner of {old}, upgraded");
        return Ok(CowOutcome::Upgraded);
    }

    let new = pool.allocate().ok_or(CowError::OutOfMemory)?;
    // SAFETY: `old` is mapped read-only everywhere, so nobody writes it; `new`
    // was just allocated and is ours alone.
    unsafe { pool.copy_frame(old, new) };

    if let Err(err) = aspace.remap(va, private.with_physical_address(new)) {
        pool.free(new);
        fatal(Fatal::RemapFailed { va, err });
    }
    pool.decrement_and_maybe_release(old);

    trace!("cow {va}: copied {old} to {new}");
    Ok(CowOutcome::Copied(new))
}

/// Share the page at `va` of `parent` with `child`, as done on fork.
///
/// A writable page becomes read-only with the COW marker in both spaces; a
/// read-only page is shared as-is. The frame gains one owner.
///
/// # Errors
/// [`MapError::NotMapped`] if `parent` has no mapping at `va`,
/// [`MapError::AlreadyMapped`] if `child` does, or any error of
/// [`AddressSpace::walk_create`] on either space. On error neither space nor
/// the owner count is changed.
pub fn share_page<C, P, Q>(
    pool: &PagePool<C>,
    parent: &mut P,
    child: &mut Q,
    va: VirtualAddress,
) -> Result<PhysicalAddress, CowError>
where
    C: CpuLocal,
    P: AddressSpace + ?Sized,
    Q: AddressSpace + ?Sized,
{
    let va = va.page_base();
    if parent.translate(va).is_none() {
        return Err(MapError::NotMapped(va).into());
    }
    let parent_slot = parent.walk_create(va)?;
    let mut entry = *parent_slot;
    let pa = entry.physical_address();
    if entry.writable() {
        entry.set_writable(false);
        entry.set_cow(true);
    }

    pool.increment(pa)?;
    match child.walk_create(va) {
        Ok(slot) if !slot.valid() => *slot = entry,
        Ok(_) => {
            pool.free(pa);
            return Err(MapError::AlreadyMapped(va).into());
        }
        Err(err) => {
            pool.free(pa);
            return Err(err.into());
        }
    }

    *parent_slot = entry;
    parent.invalidate(va);
    Ok(pa)
}

/// Remove the mapping of `va` and drop this space's ownership of the frame.
/// Returns whether the frame went back to the pool.
///
/// # Errors
/// [`MapError::NotMapped`] if there is no valid mapping at `va`.
pub fn unmap_page<C, A>(
    pool: &PagePool<C>,
    aspace: &mut A,
    va: VirtualAddress,
) -> Result<bool, CowError>
where
    C: CpuLocal,
    A: AddressSpace + ?Sized,
{
    let va = va.page_base();
    let slot = aspace.walk_create(va)?;
    if !slot.valid() {
        return Err(MapError::NotMapped(va).into());
    }
    let pa = slot.physical_address();
    *slot = PageEntryBits::new();
    aspace.invalidate(va);
    Ok(pool.decrement_and_maybe_release(pa))
}
