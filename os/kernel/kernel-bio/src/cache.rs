//! # Hash-sharded LRU buffer cache
//!
//! Buffers are spread over `nbucket` hash buckets by block number, each bucket
//! a circular list behind its own spin lock. Hits only ever touch one bucket,
//! so lookups of different blocks run in parallel.
//!
//! ```text
//!  bucket 0   ┌──────┐   ┌─────┐   ┌─────┐
//!  (lock)     │ head │ ⇄ │ buf │ ⇄ │ buf │ ⇄ …
//!             └──────┘   └─────┘   └─────┘
//!  bucket 1   ┌──────┐   ┌─────┐
//!  (lock)     │ head │ ⇄ │ buf │ ⇄ …
//!             └──────┘   └─────┘
//!     ⋮
//! ```
//!
//! ## Misses
//!
//! A miss takes the cache-wide miss lock, so at most one thread at a time
//! picks a victim or gives a block a buffer. Under that lock the target bucket
//! is searched again (someone may have loaded the block meanwhile), then
//! every bucket is scanned for the unreferenced buffer released longest ago.
//! The scan keeps the bucket of the best candidate so far locked and never
//! holds more than that one plus the bucket being inspected.
//!
//! The victim is moved to the target bucket by unlinking it under the old
//! bucket lock, dropping that lock and linking it under the new one.
//!
//! ## Lock order
//!
//! miss lock → bucket lock. Buffer sleep locks are only taken with no spin
//! lock held.

use crate::buf::{Buf, BufGuard, PinnedBuf};
use crate::config::{CacheConfig, ConfigError};
use crate::device::{BlockDevice, BlockId};
use crate::error::{Fatal, fatal};
use crate::ring::{Chain, Ring};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::cache::BLOCK_SIZE;
use kernel_sync::{SpinLock, SpinLockGuard, TicketLock};
use log::{debug, info, trace};

/// Counters since construction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found the block already cached.
    pub hits: u64,
    /// Lookups that had to give the block a buffer.
    pub misses: u64,
    /// Misses that evicted another block.
    pub recycles: u64,
}

pub struct BlockCache<D: BlockDevice> {
    config: CacheConfig,
    device: D,
    bufs: Box<[Buf]>,
    ring: Ring,
    buckets: Box<[SpinLock<Chain>]>,
    miss: TicketLock<()>,
    /// Logical time of the last release; stamps are strictly increasing.
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    recycles: AtomicU64,
}

/// Best victim so far: buffer, its locked bucket, bucket index.
type Victim<'a> = (usize, SpinLockGuard<'a, Chain>, usize);

impl<D: BlockDevice> BlockCache<D> {
    /// A cache of `config.nbuf` empty buffers in front of `device`, dealt
    /// round-robin over the buckets.
    ///
    /// # Errors
    /// A shape with no buffers, no buckets, or more list nodes than a `u16`
    /// can index.
    pub fn new(config: CacheConfig, device: D) -> Result<Self, ConfigError> {
        config.validate()?;
        let CacheConfig { nbuf, nbucket } = config;

        let ring = Ring::new(nbuf + nbucket);
        let mut buckets: Vec<_> = (0..nbucket)
            .map(|b| SpinLock::new("bcache.bucket", Chain::new(nbuf + b)))
            .collect();
        for id in 0..nbuf {
            buckets[id % nbucket].get_mut().push_front(&ring, id);
        }
        let bufs: Vec<_> = (0..nbuf).map(|_| Buf::new()).collect();

        info!("block cache: {nbuf} buffers of {BLOCK_SIZE} bytes in {nbucket} buckets");
        Ok(Self {
            config,
            device,
            bufs: bufs.into_boxed_slice(),
            ring,
            buckets: buckets.into_boxed_slice(),
            miss: TicketLock::new("bcache", ()),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            recycles: AtomicU64::new(0),
        })
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// The buffer for `block`, locked, with the caller counted as a holder.
    ///
    /// Blocks until the buffer's lock is free. The contents are only
    /// meaningful if [`BufGuard::is_valid`]; use [`read_through`] to load
    /// them.
    ///
    /// Running out of unreferenced buffers is fatal.
    ///
    /// [`read_through`]: Self::read_through
    pub fn acquire(&self, block: BlockId) -> BufGuard<'_, D> {
        let target = self.config.bucket_of(block.blockno);

        if let Some(slot) = self.find_and_ref(target, block) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("bcache hit {block}");
            return self.lock_buf(slot, block);
        }

        let miss = self.miss.lock();
        if let Some(slot) = self.find_and_ref(target, block) {
            drop(miss);
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("bcache late hit {block}");
            return self.lock_buf(slot, block);
        }
        let slot = self.recycle(target, block);
        drop(miss);

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.lock_buf(slot, block)
    }

    /// Like [`acquire`](Self::acquire), but the returned buffer always holds
    /// the block's contents, read from the device if they were not cached.
    ///
    /// A device error is fatal.
    pub fn read_through(&self, block: BlockId) -> BufGuard<'_, D> {
        let mut buf = self.acquire(block);
        if !buf.is_valid() {
            if let Err(err) = self.device.read(block, &mut buf) {
                fatal(Fatal::DeviceFailed(err));
            }
            buf.mark_valid();
        }
        buf
    }

    /// Write the buffer's contents to its block. A device error is fatal.
    pub fn flush(&self, buf: &BufGuard<'_, D>) {
        self.check_held(buf);
        if let Err(err) = self.device.write(buf.block(), buf) {
            fatal(Fatal::DeviceFailed(err));
        }
    }

    /// Unlock the buffer and drop the caller's reference. The last holder
    /// makes the buffer a recycling candidate, stamped with the current time.
    pub fn release(&self, buf: BufGuard<'_, D>) {
        self.check_held(&buf);
        drop(buf);
    }

    /// Keep the buffer in the cache after `buf` is released, until the
    /// returned token goes to [`unpin`](Self::unpin).
    pub fn pin(&self, buf: &BufGuard<'_, D>) -> PinnedBuf {
        self.check_held(buf);
        let slot = buf.slot();
        let block = buf.block();
        let _bucket = self.buckets[self.config.bucket_of(block.blockno)].lock();
        let b = &self.bufs[slot];
        b.set_refcnt(b.refcnt() + 1);
        PinnedBuf { slot, block }
    }

    /// Drop the reference taken by [`pin`](Self::pin).
    #[allow(clippy::needless_pass_by_value)]
    pub fn unpin(&self, pin: PinnedBuf) {
        let PinnedBuf { slot, block } = pin;
        let _bucket = self.buckets[self.config.bucket_of(block.blockno)].lock();
        let b = self.bufs.get(slot).filter(|b| b.holds(block));
        match b.map(Buf::refcnt) {
            Some(n) if n > 0 => self.bufs[slot].set_refcnt(n - 1),
            _ => fatal(Fatal::Unpinned(block)),
        }
    }

    /// Current number of holders of `block`, or `None` if it is not cached.
    /// Advisory: the count may change right after it is read.
    #[must_use]
    pub fn refcount(&self, block: BlockId) -> Option<u32> {
        let chain = self.buckets[self.config.bucket_of(block.blockno)].lock();
        chain
            .iter(&self.ring)
            .find(|&id| self.bufs[id].holds(block))
            .map(|id| self.bufs[id].refcnt())
    }

    /// Number of buffers currently linked into `bucket`.
    ///
    /// # Panics
    /// If `bucket` is not below `config().nbucket`.
    #[must_use]
    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.buckets[bucket].lock().len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recycles: self.recycles.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn buf(&self, slot: usize) -> &Buf {
        &self.bufs[slot]
    }

    /// Drop one holder of the buffer in `slot`, which caches `block`.
    pub(crate) fn unref(&self, slot: usize, block: BlockId) {
        let _bucket = self.buckets[self.config.bucket_of(block.blockno)].lock();
        let buf = &self.bufs[slot];
        let n = buf.refcnt();
        debug_assert!(n > 0, "release of unreferenced {block}");
        if n <= 1 {
            buf.set_refcnt(0);
            buf.stamp(self.clock.fetch_add(1, Ordering::Relaxed) + 1);
        } else {
            buf.set_refcnt(n - 1);
        }
    }

    /// Look `block` up in `bucket` and count one more holder.
    fn find_and_ref(&self, bucket: usize, block: BlockId) -> Option<usize> {
        let chain = self.buckets[bucket].lock();
        let slot = chain
            .iter(&self.ring)
            .find(|&id| self.bufs[id].holds(block))?;
        let buf = &self.bufs[slot];
        buf.set_refcnt(buf.refcnt() + 1);
        Some(slot)
    }

    /// Give `block` a buffer in bucket `target`. Caller holds the miss lock.
    fn recycle(&self, target: usize, block: BlockId) -> usize {
        let Some((slot, mut held, from)) = self.find_victim() else {
            fatal(Fatal::NoBuffers);
        };
        let buf = &self.bufs[slot];
        let previous = buf.ident();

        let chain = if from == target {
            held
        } else {
            held.unlink(&self.ring, slot);
            drop(held);
            let mut chain = self.buckets[target].lock();
            chain.push_front(&self.ring, slot);
            chain
        };
        buf.retag(block);
        drop(chain);

        if let Some(previous) = previous {
            self.recycles.fetch_add(1, Ordering::Relaxed);
            debug!("bcache: buffer {slot} recycled from {previous} to {block}");
        }
        slot
    }

    /// Scan all buckets for the unreferenced buffer with the oldest release
    /// stamp. Returns with that buffer's bucket still locked.
    fn find_victim(&self) -> Option<Victim<'_>> {
        let mut best: Option<Victim<'_>> = None;
        for (b, bucket) in self.buckets.iter().enumerate() {
            let chain = bucket.lock();
            let Some(id) = self.oldest_free(&chain) else {
                continue;
            };
            let older = best.as_ref().is_none_or(|&(best_id, _, _)| {
                self.bufs[id].lasttime() < self.bufs[best_id].lasttime()
            });
            if older {
                best = Some((id, chain, b));
            }
        }
        best
    }

    /// First buffer of `chain` with the minimum stamp among those nobody
    /// holds.
    fn oldest_free(&self, chain: &Chain) -> Option<usize> {
        chain
            .iter(&self.ring)
            .filter(|&id| self.bufs[id].refcnt() == 0)
            .reduce(|best, id| {
                if self.bufs[id].lasttime() < self.bufs[best].lasttime() {
                    id
                } else {
                    best
                }
            })
    }

    fn lock_buf(&self, slot: usize, block: BlockId) -> BufGuard<'_, D> {
        let data = self.bufs[slot].data.lock();
        BufGuard::new(self, slot, block, data)
    }

    fn check_held(&self, buf: &BufGuard<'_, D>) {
        if !buf.belongs_to(self) {
            fatal(Fatal::NotHeld(buf.block()));
        }
    }
}
