use crate::cache::BlockCache;
use crate::device::{BlockData, BlockDevice, BlockId};
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use kernel_info::cache::BLOCK_SIZE;
use kernel_sync::{SleepLock, SleepLockGuard};

/// One cache slot.
///
/// `tagged`, `ident`, `refcnt` and `lasttime` belong to the bucket the buffer
/// is on and are only changed under that bucket's lock. `valid` and `data`
/// belong to the holder of the sleep lock. The atomics only give the fields a
/// shared home; the locks provide the ordering.
pub(crate) struct Buf {
    /// Cleared until the buffer first holds a block; `ident` means nothing
    /// while it is.
    tagged: AtomicBool,
    ident: AtomicU64,
    refcnt: AtomicU32,
    lasttime: AtomicU64,
    valid: AtomicBool,
    pub(crate) data: SleepLock<BlockData>,
}

impl Buf {
    pub(crate) fn new() -> Self {
        Self {
            tagged: AtomicBool::new(false),
            ident: AtomicU64::new(0),
            refcnt: AtomicU32::new(0),
            lasttime: AtomicU64::new(0),
            valid: AtomicBool::new(false),
            data: SleepLock::new("buffer", [0; BLOCK_SIZE]),
        }
    }

    #[inline]
    pub(crate) fn ident(&self) -> Option<BlockId> {
        self.tagged
            .load(Ordering::Relaxed)
            .then(|| BlockId::from_bits(self.ident.load(Ordering::Relaxed)))
    }

    #[inline]
    pub(crate) fn holds(&self, block: BlockId) -> bool {
        self.tagged.load(Ordering::Relaxed)
            && self.ident.load(Ordering::Relaxed) == block.to_bits()
    }

    #[inline]
    pub(crate) fn refcnt(&self) -> u32 {
        self.refcnt.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn lasttime(&self) -> u64 {
        self.lasttime.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_refcnt(&self, n: u32) {
        self.refcnt.store(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn stamp(&self, time: u64) {
        self.lasttime.store(time, Ordering::Relaxed);
    }

    /// Give the buffer a new identity with no loaded contents and one holder.
    pub(crate) fn retag(&self, block: BlockId) {
        self.ident.store(block.to_bits(), Ordering::Relaxed);
        self.tagged.store(true, Ordering::Relaxed);
        self.valid.store(false, Ordering::Relaxed);
        self.refcnt.store(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_valid(&self) {
        self.valid.store(true, Ordering::Relaxed);
    }
}

/// A cached block, locked for exclusive use.
///
/// Only a `BufGuard` gives access to a buffer's bytes, and only while it
/// lives is the buffer's sleep lock held. Dropping it (or passing it to
/// [`BlockCache::release`]) releases the sleep lock first and then drops the
/// holder's reference under the bucket lock.
#[must_use = "dropping the guard releases the buffer"]
pub struct BufGuard<'a, D: BlockDevice> {
    cache: &'a BlockCache<D>,
    slot: usize,
    block: BlockId,
    data: Option<SleepLockGuard<'a, BlockData>>,
}

impl<'a, D: BlockDevice> BufGuard<'a, D> {
    pub(crate) fn new(
        cache: &'a BlockCache<D>,
        slot: usize,
        block: BlockId,
        data: SleepLockGuard<'a, BlockData>,
    ) -> Self {
        Self {
            cache,
            slot,
            block,
            data: Some(data),
        }
    }

    /// The block this buffer caches.
    #[inline]
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Index of the buffer inside its cache.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Whether the contents have been loaded from (or written for) the block.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.cache.buf(self.slot).is_valid()
    }

    /// Declare the contents authoritative without reading the device, e.g.
    /// after overwriting the whole block.
    #[inline]
    pub fn mark_valid(&mut self) {
        self.cache.buf(self.slot).set_valid();
    }

    #[inline]
    pub(crate) fn belongs_to(&self, cache: &BlockCache<D>) -> bool {
        core::ptr::eq(self.cache, cache)
    }
}

impl<D: BlockDevice> Deref for BufGuard<'_, D> {
    type Target = BlockData;

    fn deref(&self) -> &BlockData {
        match self.data.as_deref() {
            Some(data) => data,
            None => unreachable!("buffer used after release"),
        }
    }
}

impl<D: BlockDevice> DerefMut for BufGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut BlockData {
        match self.data.as_deref_mut() {
            Some(data) => data,
            None => unreachable!("buffer used after release"),
        }
    }
}

impl<D: BlockDevice> Drop for BufGuard<'_, D> {
    fn drop(&mut self) {
        drop(self.data.take());
        self.cache.unref(self.slot, self.block);
    }
}

impl<D: BlockDevice> fmt::Debug for BufGuard<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufGuard")
            .field("block", &self.block)
            .field("slot", &self.slot)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

/// A reference that keeps a buffer from being recycled without holding its
/// lock. Hand it back to [`BlockCache::unpin`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a pinned buffer stays in the cache until unpinned"]
pub struct PinnedBuf {
    pub(crate) slot: usize,
    pub(crate) block: BlockId,
}

impl PinnedBuf {
    #[inline]
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }
}
