use kernel_bio::{BlockCache, BlockId, CacheConfig, CacheStats, RamDisk};
use kernel_info::cache::BLOCK_SIZE;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn cache(nbuf: usize, nbucket: usize) -> BlockCache<RamDisk> {
    BlockCache::new(CacheConfig::new(nbuf, nbucket), RamDisk::new(2, 64)).unwrap()
}

fn touch(cache: &BlockCache<RamDisk>, blockno: u32) {
    cache.release(cache.acquire(BlockId::new(0, blockno)));
}

#[test]
fn concurrent_acquire_shares_one_buffer() {
    const THREADS: usize = 8;

    let cache = Arc::new(cache(4, 3));
    let barrier = Arc::new(Barrier::new(THREADS));
    let id = BlockId::new(1, 9);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let buf = cache.acquire(id);
                let pin = cache.pin(&buf);
                let slot = buf.slot();
                cache.release(buf);
                (slot, pin)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let slot = results[0].0;
    assert!(results.iter().all(|(s, _)| *s == slot));
    assert_eq!(cache.refcount(id), Some(8));
    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 7,
            misses: 1,
            recycles: 0,
        }
    );

    for (_, pin) in results {
        cache.unpin(pin);
    }
    assert_eq!(cache.refcount(id), Some(0));
}

#[test]
fn waiters_block_until_release() {
    let cache = Arc::new(cache(2, 1));
    let id = BlockId::new(0, 3);
    let released = Arc::new(AtomicBool::new(false));

    let held = cache.acquire(id);
    let waiter = {
        let cache = Arc::clone(&cache);
        let released = Arc::clone(&released);
        thread::spawn(move || {
            let buf = cache.acquire(id);
            assert!(released.load(Ordering::SeqCst), "lock handed out twice");
            cache.release(buf);
        })
    };

    while cache.refcount(id) != Some(2) {
        thread::yield_now();
    }
    released.store(true, Ordering::SeqCst);
    cache.release(held);
    waiter.join().unwrap();
    assert_eq!(cache.refcount(id), Some(0));
}

#[test]
fn victim_is_the_least_recently_released() {
    let cache = cache(3, 2);
    for blockno in [0, 1, 2] {
        touch(&cache, blockno);
    }
    touch(&cache, 0);

    touch(&cache, 3);
    assert_eq!(cache.refcount(BlockId::new(0, 1)), None, "block 1 was oldest");
    assert_eq!(cache.refcount(BlockId::new(0, 0)), Some(0));
    assert_eq!(cache.refcount(BlockId::new(0, 2)), Some(0));

    touch(&cache, 4);
    assert_eq!(cache.refcount(BlockId::new(0, 2)), None);
    assert_eq!(cache.stats().recycles, 2);
}

#[test]
fn referenced_buffers_are_never_recycled() {
    let cache = cache(3, 2);
    let held = cache.acquire(BlockId::new(0, 0));
    let pinned = {
        let buf = cache.acquire(BlockId::new(0, 1));
        let pin = cache.pin(&buf);
        cache.release(buf);
        pin
    };

    for blockno in 10..40 {
        touch(&cache, blockno);
    }
    assert_eq!(cache.refcount(BlockId::new(0, 0)), Some(1));
    assert_eq!(cache.refcount(BlockId::new(0, 1)), Some(1));
    assert_eq!(cache.stats().recycles, 29);

    cache.unpin(pinned);
    cache.release(held);
    for blockno in 50..53 {
        touch(&cache, blockno);
    }
    assert_eq!(cache.refcount(BlockId::new(0, 0)), None);
    assert_eq!(cache.refcount(BlockId::new(0, 1)), None);
}

#[test]
fn flushed_contents_survive_eviction() {
    let cache = cache(4, 3);
    let id = BlockId::new(1, 5);

    let mut buf = cache.read_through(id);
    assert!(buf.is_valid());
    buf.copy_from_slice(&[0xC3; BLOCK_SIZE]);
    cache.flush(&buf);
    cache.release(buf);
    assert_eq!(cache.device().writes(), 1);

    for blockno in 10..30 {
        let buf = cache.read_through(BlockId::new(1, blockno));
        cache.release(buf);
    }
    assert_eq!(cache.refcount(id), None);

    let reads = cache.device().reads();
    let buf = cache.read_through(id);
    assert_eq!(cache.device().reads(), reads + 1);
    assert!(buf.iter().all(|&b| b == 0xC3));
}

#[test]
fn highest_block_id_misses_on_a_fresh_cache() {
    let cache = BlockCache::new(CacheConfig::new(2, 1), RamDisk::new(1, 4)).unwrap();
    let id = BlockId::new(u32::MAX, u32::MAX);
    assert_eq!(cache.refcount(id), None);

    let buf = cache.acquire(id);
    assert!(!buf.is_valid());
    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 0,
            misses: 1,
            recycles: 0,
        }
    );
    cache.release(buf);
    assert_eq!(cache.refcount(id), Some(0));
}

#[test]
fn cached_block_is_not_read_twice() {
    let cache = cache(4, 3);
    let id = BlockId::new(0, 2);
    cache.release(cache.read_through(id));
    cache.release(cache.read_through(id));
    assert_eq!(cache.device().reads(), 1);
    assert_eq!(cache.stats().hits, 1);
}

/// Deterministic uniform picks over `0..n`.
fn workload(n: u32, len: usize) -> impl Iterator<Item = u32> {
    let mut x: u32 = 0x2545_f491;
    (0..len).map(move |_| {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        x % n
    })
}

fn run_workload(config: CacheConfig) -> CacheStats {
    let cache = BlockCache::new(config, RamDisk::new(1, 64)).unwrap();
    for blockno in workload(26, 2000) {
        let buf = cache.read_through(BlockId::new(0, blockno));
        cache.release(buf);
    }
    let linked: usize = (0..config.nbucket).map(|b| cache.bucket_len(b)).sum();
    assert_eq!(linked, config.nbuf);
    cache.stats()
}

#[test]
fn hit_rate_does_not_depend_on_bucket_count() {
    let distinct = workload(26, 2000).collect::<HashSet<_>>().len() as u64;
    let fits = run_workload(CacheConfig::default());
    assert_eq!(
        fits,
        CacheStats {
            hits: 2000 - distinct,
            misses: distinct,
            recycles: 0,
        }
    );

    let tight = run_workload(CacheConfig::new(20, 13));
    assert!(tight.recycles > 0);
    for nbucket in [1, 2, 7, 26] {
        assert_eq!(run_workload(CacheConfig::new(20, nbucket)), tight, "{nbucket} buckets");
    }
}

#[test]
fn parallel_writers_on_disjoint_blocks() {
    const THREADS: u32 = 4;
    const ROUNDS: u32 = 50;

    let cache = Arc::new(cache(6, 5));
    let barrier = Arc::new(Barrier::new(THREADS as usize));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..ROUNDS {
                    let id = BlockId::new(0, t * 10 + round % 5);
                    let mut buf = cache.read_through(id);
                    buf[0] = buf[0].wrapping_add(1);
                    cache.flush(&buf);
                    cache.release(buf);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for t in 0..THREADS {
        for k in 0..5 {
            let data = cache.device().snapshot(BlockId::new(0, t * 10 + k)).unwrap();
            assert_eq!(data[0], 10, "block {}", t * 10 + k);
        }
    }
}

#[test]
#[should_panic(expected = "no buffers")]
fn running_out_of_buffers_is_fatal() {
    let cache = cache(2, 2);
    let _a = cache.acquire(BlockId::new(0, 0));
    let _b = cache.acquire(BlockId::new(0, 1));
    let _c = cache.acquire(BlockId::new(0, 2));
}

#[test]
#[should_panic(expected = "device failure")]
fn device_errors_are_fatal() {
    let cache = cache(2, 2);
    let _ = cache.read_through(BlockId::new(0, 64));
}

#[test]
#[should_panic(expected = "is not locked by this cache's caller")]
fn flushing_a_foreign_buffer_is_fatal() {
    let a = cache(2, 2);
    let b = cache(2, 2);
    let buf = a.acquire(BlockId::new(0, 1));
    b.flush(&buf);
}

#[test]
#[should_panic(expected = "without a matching pin")]
fn unpinning_into_the_wrong_cache_is_fatal() {
    let a = cache(2, 2);
    let b = cache(2, 2);
    let buf = a.acquire(BlockId::new(0, 1));
    let pin = a.pin(&buf);
    a.release(buf);
    b.unpin(pin);
}
