use kernel_alloc::{AllocError, ConfigError, PagePool, PhysLayout, PhysicalAddress};
use kernel_info::memory::{ALLOC_FILL, FREE_FILL, PAGE_SIZE};
use kernel_sync::{CpuLocal, FixedCpu, ThreadCpu};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const BASE: u64 = 0x8020_0000;

fn fixed_pool(frames: u64, ncpu: usize) -> PagePool<FixedCpu> {
    PagePool::new(PhysLayout::with_frames(BASE, frames), ncpu, FixedCpu::new(0)).unwrap()
}

fn frame_is_filled_with<C: CpuLocal>(pool: &PagePool<C>, pa: PhysicalAddress, byte: u8) -> bool {
    unsafe { pool.frame(pa) }.iter().all(|&b| b == byte)
}

#[test]
fn boot_seeds_the_constructing_cpu() {
    let pool = fixed_pool(16, 4);
    assert_eq!(pool.free_frames(), 16);
    assert_eq!(pool.shard_len(0), 16);
    assert_eq!(pool.shard_len(1), 0);
    assert_eq!(pool.shard_len(3), 0);
}

#[test]
fn rejects_invalid_configuration() {
    let layout = PhysLayout::with_frames(BASE, 4);
    assert!(matches!(
        PagePool::new(layout, 0, FixedCpu::new(0)),
        Err(ConfigError::NoCpus)
    ));
    assert!(matches!(
        PagePool::new(PhysLayout::new(BASE, BASE), 1, FixedCpu::new(0)),
        Err(ConfigError::EmptyRange { .. })
    ));
}

#[test]
fn allocated_frames_are_distinct_and_poisoned() {
    let pool = fixed_pool(8, 1);
    let frames: Vec<_> = (0..8).map(|_| pool.allocate().unwrap()).collect();

    let unique: HashSet<_> = frames.iter().copied().collect();
    assert_eq!(unique.len(), 8);
    for &pa in &frames {
        assert!(pa.is_page_aligned());
        assert!(pa.as_u64() >= BASE && pa.as_u64() < BASE + 8 * PAGE_SIZE);
        assert!(frame_is_filled_with(&pool, pa, ALLOC_FILL));
        assert_eq!(pool.refcount(pa), Ok(1));
    }

    assert_eq!(pool.allocate(), None);
    assert_eq!(pool.free_frames(), 0);

    pool.free(frames[3]);
    assert!(frame_is_filled_with(&pool, frames[3], FREE_FILL));
    assert_eq!(pool.refcount(frames[3]), Ok(0));
    assert_eq!(pool.allocate(), Some(frames[3]));
}

#[test]
fn stealing_scans_upwards_from_the_next_cpu() {
    let pool = PagePool::new(PhysLayout::with_frames(BASE, 4), 4, ThreadCpu).unwrap();
    ThreadCpu::bind(0);
    let a = pool.allocate().unwrap();
    let b = pool.allocate().unwrap();
    let _c = pool.allocate().unwrap();
    let _d = pool.allocate().unwrap();

    ThreadCpu::bind(1);
    pool.free(a);
    ThreadCpu::bind(3);
    pool.free(b);
    assert_eq!(pool.shard_len(1), 1);
    assert_eq!(pool.shard_len(3), 1);

    ThreadCpu::bind(2);
    assert_eq!(pool.allocate(), Some(b), "cpu 3 is visited before cpu 1");
    assert_eq!(pool.allocate(), Some(a), "then 0 and 1 after wrapping");
    assert_eq!(pool.allocate(), None);
    assert_eq!(ThreadCpu::depth(), 0);
}

#[test]
fn eight_frames_two_cpus_under_contention() {
    const ROUNDS: usize = 200;

    let pool = Arc::new(PagePool::new(PhysLayout::with_frames(BASE, 8), 2, ThreadCpu).unwrap());
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2usize)
        .map(|cpu| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                ThreadCpu::bind(cpu);
                barrier.wait();

                let first: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
                barrier.wait();
                assert_eq!(pool.allocate(), None);
                barrier.wait();

                for &pa in &first {
                    pool.free(pa);
                }
                barrier.wait();

                for round in 0..ROUNDS {
                    let pa = pool.allocate().unwrap();
                    let marker = u8::try_from((cpu * ROUNDS + round) % 251).unwrap();
                    unsafe { pool.frame_mut(pa) }.fill(marker);
                    thread::yield_now();
                    assert!(frame_is_filled_with(&*pool, pa, marker), "frame handed out twice");
                    pool.free(pa);
                }
                first
            })
        })
        .collect();

    let mut handed_out = HashSet::new();
    for h in handles {
        for pa in h.join().unwrap() {
            assert!(handed_out.insert(pa), "{pa} handed out twice");
        }
    }
    assert_eq!(handed_out.len(), 8);
    assert_eq!(pool.free_frames(), 8);
}

#[test]
fn shared_frame_is_released_exactly_once() {
    let pool = fixed_pool(2, 1);
    let pa = pool.allocate().unwrap();
    assert_eq!(pool.increment(pa), Ok(2));
    assert_eq!(pool.increment(pa), Ok(3));

    assert!(!pool.decrement_and_maybe_release(pa));
    assert!(!pool.decrement_and_maybe_release(pa));
    assert_eq!(pool.free_frames(), 1);
    assert!(frame_is_filled_with(&pool, pa, ALLOC_FILL));

    assert!(pool.decrement_and_maybe_release(pa));
    assert_eq!(pool.free_frames(), 2);
}

#[test]
fn increment_rejects_unmanaged_addresses() {
    let pool = fixed_pool(2, 1);
    let kernel = PhysicalAddress::new(BASE - PAGE_SIZE);
    let misaligned = PhysicalAddress::new(BASE + 8);
    assert_eq!(pool.increment(kernel), Err(AllocError::InvalidAddress(kernel)));
    assert_eq!(
        pool.increment(misaligned),
        Err(AllocError::InvalidAddress(misaligned))
    );
}

#[test]
#[should_panic(expected = "was shared while free")]
fn sharing_a_free_frame_is_fatal() {
    let pool = fixed_pool(2, 1);
    let _ = pool.increment(PhysicalAddress::new(BASE));
}

#[test]
#[should_panic(expected = "kfree")]
fn freeing_a_misaligned_address_is_fatal() {
    let pool = fixed_pool(2, 1);
    pool.free(PhysicalAddress::new(BASE + 1));
}

#[test]
#[should_panic(expected = "kfree")]
fn freeing_kernel_memory_is_fatal() {
    let pool = fixed_pool(2, 1);
    pool.free(PhysicalAddress::new(BASE - PAGE_SIZE));
}

#[test]
#[should_panic(expected = "kfree")]
fn freeing_beyond_the_top_is_fatal() {
    let pool = fixed_pool(2, 1);
    pool.free(PhysicalAddress::new(BASE + 2 * PAGE_SIZE));
}

#[test]
#[should_panic(expected = "below zero")]
fn double_free_is_fatal() {
    let pool = fixed_pool(2, 1);
    let pa = pool.allocate().unwrap();
    pool.free(pa);
    pool.free(pa);
}

#[test]
#[should_panic(expected = "outside of the 2 configured CPUs")]
fn running_on_an_unknown_cpu_is_fatal() {
    let _ = PagePool::new(PhysLayout::with_frames(BASE, 2), 2, FixedCpu::new(5));
}
