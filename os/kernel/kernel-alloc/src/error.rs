//! Recoverable errors and unrecoverable contract violations.
//!
//! Recoverable conditions are ordinary `Result` values. Everything in
//! [`Fatal`] means a caller broke an ownership invariant; those halt the
//! kernel through [`fatal`] and are never returned.

use crate::address_space::MapError;
use crate::addresses::{PhysicalAddress, VirtualAddress};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("{0} is not a managed frame")]
    InvalidAddress(PhysicalAddress),
}

/// Unrecoverable page pool conditions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fatal {
    #[error("kfree: {0} is misaligned, kernel-reserved or beyond managed memory")]
    BadFree(PhysicalAddress),
    #[error("refcount of {0} would drop below zero")]
    NegativeRefCount(PhysicalAddress),
    #[error("refcount of {0} overflowed")]
    RefCountOverflow(PhysicalAddress),
    #[error("{0} was shared while free")]
    SharedFreeFrame(PhysicalAddress),
    #[error("{0} was handed out while still referenced")]
    AllocatedLiveFrame(PhysicalAddress),
    #[error("{0} is mapped but has no owner")]
    MappedFreeFrame(PhysicalAddress),
    #[error("cpu {cpu} outside of the {ncpu} configured CPUs")]
    UnknownCpu { cpu: usize, ncpu: usize },
    #[error("copy-on-write remap of {va} failed: {err}")]
    RemapFailed { va: VirtualAddress, err: MapError },
}

/// Report an unrecoverable condition and halt.
#[cold]
#[track_caller]
pub fn fatal(err: Fatal) -> ! {
    log::error!("fatal: {err}");
    panic!("{err}")
}
