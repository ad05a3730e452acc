use crate::device::BlockId;

/// Failures reported by a [`BlockDevice`](crate::BlockDevice).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("no device {0}")]
    NoSuchDevice(u32),
    #[error("{0} is beyond the end of the device")]
    OutOfRange(BlockId),
}

/// Unrecoverable block cache conditions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fatal {
    #[error("bget: no buffers")]
    NoBuffers,
    #[error("device failure: {0}")]
    DeviceFailed(DeviceError),
    #[error("{0} is not locked by this cache's caller")]
    NotHeld(BlockId),
    #[error("unpin of {0} without a matching pin")]
    Unpinned(BlockId),
}

/// Report an unrecoverable condition and halt.
#[cold]
#[track_caller]
pub fn fatal(err: Fatal) -> ! {
    log::error!("fatal: {err}");
    panic!("{err}")
}
