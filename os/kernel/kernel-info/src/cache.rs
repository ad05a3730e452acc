//! # Block Cache Geometry

/// Size of one cached disk block in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Maximum number of blocks any single filesystem operation writes.
pub const MAX_OP_BLOCKS: usize = 10;

/// Number of buffers in the cache.
pub const NBUF: usize = MAX_OP_BLOCKS * 3;

/// Number of hash buckets the buffers are sharded into.
///
/// A prime keeps sequential block numbers spread across buckets.
pub const NBUCKET: usize = 13;

const _: () = {
    assert!(BLOCK_SIZE.is_power_of_two());
    assert!(NBUF >= NBUCKET);
    assert!(NBUCKET > 0);
};
