//! # Physical page allocation and copy-on-write sharing
//!
//! This crate owns every physical page frame above the kernel image. It hands
//! frames out one at a time, counts how many address spaces map each frame,
//! and resolves write faults on pages shared between address spaces.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │           Copy-on-write fault handler               │
//! │    • share_page / handle_cow_fault / unmap_page     │
//! │    • consumes an AddressSpace (translate, remap)    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                  Page pool                          │
//! │    • one free-list shard per CPU, stealing          │
//! │    • reference table: one owner count per frame     │
//! │    • fill patterns on allocate and release          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//!
//! A frame is either *free* (on exactly one shard, owner count 0) or *owned*
//! (count ≥ 1). The only way back onto a shard is the count dropping to zero in
//! [`PagePool::decrement_and_maybe_release`]; [`PagePool::free`] is the same
//! path.
//!
//! ## Failure
//!
//! Running out of frames is an ordinary [`None`] / [`CowError::OutOfMemory`].
//! Breaking ownership (freeing a kernel address, dropping a count below zero,
//! a remap that fails halfway through a copy) is not recoverable and ends in
//! [`fatal`], which logs and panics.
//!
//! ## Example
//!
//! ```rust
//! use kernel_alloc::{PagePool, PhysLayout};
//! use kernel_sync::FixedCpu;
//!
//! let layout = PhysLayout::with_frames(0x8020_0000, 4);
//! let pool = PagePool::new(layout, 2, FixedCpu::new(0)).unwrap();
//! assert_eq!(pool.free_frames(), 4);
//!
//! let pa = pool.allocate().unwrap();
//! assert_eq!(pool.refcount(pa), Ok(1));
//! pool.free(pa);
//! assert_eq!(pool.free_frames(), 4);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod address_space;
mod addresses;
mod cow;
mod error;
mod frame_alloc;
mod free_list;
mod layout;
mod page_entry_bits;
mod phys_mapper;
mod refcount;

pub use address_space::{AddressSpace, MapError, SoftPageTable};
pub use addresses::{FrameIndex, PhysicalAddress, VirtualAddress};
pub use cow::{CowError, CowOutcome, handle_cow_fault, share_page, unmap_page};
pub use error::{AllocError, Fatal, fatal};
pub use frame_alloc::PagePool;
pub use layout::{ConfigError, PhysLayout};
pub use page_entry_bits::PageEntryBits;
pub use phys_mapper::{FRAME_BYTES, FrameBytes};
