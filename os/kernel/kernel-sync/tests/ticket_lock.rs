use kernel_sync::TicketLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn queued_counts_holder() {
    let l = TicketLock::new("refcnt", 7u16);
    assert_eq!(l.queued(), 0);
    let g = l.lock();
    assert_eq!(*g, 7);
    assert_eq!(l.queued(), 1);
    assert!(l.is_locked());
    drop(g);
    assert!(!l.is_locked());
}

#[test]
fn try_lock_respects_holder() {
    let l = TicketLock::new("miss", ());
    let g = l.try_lock().expect("free lock");
    assert!(l.try_lock().is_none());
    drop(g);
    assert!(l.try_lock().is_some());
    assert!(!l.is_locked());
}

#[test]
fn contended_ticket_lock_is_exclusive() {
    let threads = 6;
    let iters = 2_000;
    let lock = Arc::new(TicketLock::new("counter", 0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    let mut g = lock.lock();
                    assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0);
                    *g += 1;
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(lock.with_lock(|v| *v), threads * iters);
}
