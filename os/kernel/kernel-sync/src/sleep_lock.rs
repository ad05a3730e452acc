use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Long-term exclusive lock.
///
/// Unlike [`SpinLock`](crate::SpinLock), a holder may keep a `SleepLock` across
/// blocking operations such as device I/O. With the `std` feature waiters
/// yield their thread while they wait. Without it they spin with a relax hint
/// between reads of the lock word.
///
/// A `SleepLock` must never be acquired while holding a spin lock.
pub struct SleepLock<T> {
    locked: AtomicBool,
    name: &'static str,
    cell: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SleepLock<T> {}
unsafe impl<T: Send> Send for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            cell: UnsafeCell::new(value),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the lock is free, then take it.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        loop {
            if let Some(g) = self.try_lock() {
                return g;
            }
            while self.locked.load(Ordering::Relaxed) {
                relax();
            }
        }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SleepLockGuard { lock: self })
    }

    /// Whether any holder currently owns the lock. Advisory only.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.cell.get_mut()
    }
}

impl<T> fmt::Debug for SleepLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "std")]
#[inline]
fn relax() {
    std::thread::yield_now();
}

#[cfg(not(feature = "std"))]
#[inline]
fn relax() {
    core::hint::spin_loop();
}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
}

impl<T> SleepLockGuard<'_, T> {
    /// The lock this guard holds; lets callers assert ownership of a specific
    /// lock.
    #[inline]
    #[must_use]
    pub fn holds(&self, lock: &SleepLock<T>) -> bool {
        core::ptr::eq(self.lock, lock)
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.cell.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.cell.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
