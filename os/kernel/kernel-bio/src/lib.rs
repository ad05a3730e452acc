//! # Block buffer cache
//!
//! A fixed pool of block-sized buffers in front of a [`BlockDevice`]. Callers
//! look blocks up by `(device, block number)`; the cache hands back a locked
//! [`BufGuard`], loading the block through the device if asked to.
//!
//! ## Lifecycle of a buffer
//!
//! ```text
//!   empty ──miss──▶ tagged, !valid ──read_through──▶ valid ⇄ modified/flushed
//!     ▲                                                   │
//!     └────────── recycled (no holders, oldest release) ◀─┘
//! ```
//!
//! Buffers are never created or freed after construction; they are re-tagged
//! with another block when recycled. A buffer with any holder (a live
//! [`BufGuard`] or a [`PinnedBuf`]) is never recycled.
//!
//! ## Example
//!
//! ```rust
//! use kernel_bio::{BlockCache, BlockId, CacheConfig, RamDisk};
//!
//! let cache = BlockCache::new(CacheConfig::new(4, 3), RamDisk::new(1, 16)).unwrap();
//! let id = BlockId::new(0, 7);
//!
//! let mut buf = cache.read_through(id);
//! buf[0] = 0x42;
//! cache.flush(&buf);
//! cache.release(buf);
//!
//! assert_eq!(cache.device().snapshot(id).unwrap()[0], 0x42);
//! assert_eq!(cache.stats().misses, 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod buf;
mod cache;
mod config;
mod device;
mod error;
mod ring;

pub use buf::{BufGuard, PinnedBuf};
pub use cache::{BlockCache, CacheStats};
pub use config::{CacheConfig, ConfigError};
pub use device::{BlockData, BlockDevice, BlockId, RamDisk};
pub use error::{DeviceError, Fatal, fatal};
