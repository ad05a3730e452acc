//! Storage-driver interface and a RAM-backed device.

use crate::error::DeviceError;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_info::cache::BLOCK_SIZE;
use kernel_sync::SpinLock;

/// Contents of one disk block.
pub type BlockData = [u8; BLOCK_SIZE];

/// Identity of one disk block: a device and a block number on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    pub dev: u32,
    pub blockno: u32,
}

impl BlockId {
    #[inline]
    #[must_use]
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }

    #[inline]
    pub(crate) const fn to_bits(self) -> u64 {
        ((self.dev as u64) << 32) | self.blockno as u64
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn from_bits(bits: u64) -> Self {
        Self::new((bits >> 32) as u32, bits as u32)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}:{}", self.dev, self.blockno)
    }
}

/// A synchronous block storage driver.
///
/// Both calls block the caller until the device has completed the transfer.
/// The cache calls them while holding the buffer's exclusive lock and never
/// while holding a bucket lock.
pub trait BlockDevice: Sync {
    /// Fill `data` with the contents of `block`.
    ///
    /// # Errors
    /// Any [`DeviceError`]; the cache treats all of them as fatal.
    fn read(&self, block: BlockId, data: &mut BlockData) -> Result<(), DeviceError>;

    /// Write `data` to `block`.
    ///
    /// # Errors
    /// Any [`DeviceError`]; the cache treats all of them as fatal.
    fn write(&self, block: BlockId, data: &BlockData) -> Result<(), DeviceError>;
}

/// An in-memory disk of `blocks` blocks per device, for hosted runs and tests.
pub struct RamDisk {
    devices: u32,
    blocks: u32,
    storage: Box<[SpinLock<BlockData>]>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    /// A zero-filled disk serving devices `0..devices`.
    #[must_use]
    pub fn new(devices: u32, blocks: u32) -> Self {
        let total = devices as usize * blocks as usize;
        let storage: Vec<_> = (0..total)
            .map(|_| SpinLock::new("ramdisk", [0; BLOCK_SIZE]))
            .collect();
        Self {
            devices,
            blocks,
            storage: storage.into_boxed_slice(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of completed reads.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of completed writes.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// A copy of what is currently stored for `block`, bypassing any cache.
    ///
    /// # Errors
    /// If `block` is not on this disk.
    pub fn snapshot(&self, block: BlockId) -> Result<BlockData, DeviceError> {
        let cell = self.cell(block)?;
        Ok(*cell.lock())
    }

    fn cell(&self, block: BlockId) -> Result<&SpinLock<BlockData>, DeviceError> {
        if block.dev >= self.devices {
            return Err(DeviceError::NoSuchDevice(block.dev));
        }
        if block.blockno >= self.blocks {
            return Err(DeviceError::OutOfRange(block));
        }
        let index = block.dev as usize * self.blocks as usize + block.blockno as usize;
        Ok(&self.storage[index])
    }
}

impl BlockDevice for RamDisk {
    fn read(&self, block: BlockId, data: &mut BlockData) -> Result<(), DeviceError> {
        data.copy_from_slice(&*self.cell(block)?.lock());
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write(&self, block: BlockId, data: &BlockData) -> Result<(), DeviceError> {
        self.cell(block)?.lock().copy_from_slice(data);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl fmt::Debug for RamDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamDisk")
            .field("devices", &self.devices)
            .field("blocks", &self.blocks)
            .field("reads", &self.reads())
            .field("writes", &self.writes())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ids_survive_packing() {
        let id = BlockId::new(3, 0xdead_beef);
        assert_eq!(BlockId::from_bits(id.to_bits()), id);
        let last = BlockId::new(u32::MAX, u32::MAX);
        assert_eq!(BlockId::from_bits(last.to_bits()), last);
    }

    #[test]
    fn ramdisk_keeps_devices_apart() {
        let disk = RamDisk::new(2, 4);
        disk.write(BlockId::new(1, 2), &[7; BLOCK_SIZE]).unwrap();

        let mut data = [0; BLOCK_SIZE];
        disk.read(BlockId::new(0, 2), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
        disk.read(BlockId::new(1, 2), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 7));
        assert_eq!((disk.reads(), disk.writes()), (2, 1));

        assert_eq!(
            disk.read(BlockId::new(0, 4), &mut data),
            Err(DeviceError::OutOfRange(BlockId::new(0, 4)))
        );
        assert_eq!(
            disk.read(BlockId::new(2, 0), &mut data),
            Err(DeviceError::NoSuchDevice(2))
        );
    }
}
