use kernel_info::cache::{NBUCKET, NBUF};

/// Shape of a [`BlockCache`](crate::BlockCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of buffers. Fixed for the lifetime of the cache.
    pub nbuf: usize,
    /// Number of hash buckets; block `n` lives in bucket `n % nbucket`.
    pub nbucket: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nbucket: NBUCKET,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("a block cache needs at least one buffer")]
    NoBuffers,
    #[error("a block cache needs at least one bucket")]
    NoBuckets,
    #[error("{0} buffers and buckets exceed the list index range")]
    TooManyBuffers(usize),
}

impl CacheConfig {
    #[must_use]
    pub const fn new(nbuf: usize, nbucket: usize) -> Self {
        Self { nbuf, nbucket }
    }

    pub(crate) const fn validate(&self) -> Result<(), ConfigError> {
        if self.nbuf == 0 {
            return Err(ConfigError::NoBuffers);
        }
        if self.nbucket == 0 {
            return Err(ConfigError::NoBuckets);
        }
        let nodes = self.nbuf + self.nbucket;
        if nodes > u16::MAX as usize {
            return Err(ConfigError::TooManyBuffers(nodes));
        }
        Ok(())
    }

    #[inline]
    pub(crate) const fn bucket_of(&self, blockno: u32) -> usize {
        blockno as usize % self.nbucket
    }
}
