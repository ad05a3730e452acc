//! # Kernel Configuration
//!
//! This crate is the single source of truth for the compile-time parameters of
//! the kernel's physical resource core: how physical memory is laid out and
//! poisoned, how many CPUs share the page pool, and how the disk block cache is
//! sized and sharded.
//!
//! ## Layout
//!
//! ### Physical Memory ([`memory`])
//!
//! ```text
//! Physical Memory Layout:
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory / MMIO           │
//! PHYS_LOAD   ├─────────────────────────────────┤ 0x8000_0000
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//! KERNEL_END  ├─────────────────────────────────┤
//!             │    Managed RAM                  │
//!             │  (per-CPU page pool)            │
//! PHYS_TOP    └─────────────────────────────────┘
//! ```
//!
//! Every 4 KiB frame in `[KERNEL_END, PHYS_TOP)` is owned by the page pool.
//! Frames handed out are filled with [`ALLOC_FILL`](memory::ALLOC_FILL);
//! frames returned are filled with [`FREE_FILL`](memory::FREE_FILL), so stale
//! reads through dangling references show up as recognizable garbage.
//!
//! ### Block Cache ([`cache`])
//!
//! A fixed pool of [`NBUF`](cache::NBUF) buffers of
//! [`BLOCK_SIZE`](cache::BLOCK_SIZE) bytes each, sharded into
//! [`NBUCKET`](cache::NBUCKET) hash buckets keyed by block number.
//!
//! ## Compile-Time Validation
//!
//! Each module carries `const` assertions, so an inconsistent configuration
//! fails the build instead of the boot.
//!
//! ```rust
//! use kernel_info::memory::{KERNEL_END, PAGE_SIZE, PHYS_TOP};
//!
//! let frames = (PHYS_TOP - KERNEL_END) / PAGE_SIZE;
//! assert!(frames > 0);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod cache;
pub mod memory;
