//! # CPU identity and pinning
//!
//! Per-CPU structures are only sound if the CPU an operation started on is the
//! CPU it finishes on. In the kernel this is achieved by masking interrupts
//! (`push_off`/`pop_off`, nesting); hosted builds map each thread to a logical
//! CPU instead.
//!
//! ```rust
//! use kernel_sync::{CpuPin, FixedCpu};
//!
//! let cpu = FixedCpu::new(3);
//! let pin = CpuPin::new(&cpu);
//! assert_eq!(pin.id(), 3);
//! ```

/// Access to the identity of the executing CPU.
///
/// # Contract
/// - Between `push_off` and the matching `pop_off` the executing context must
///   not migrate, so `cpu_id` keeps returning the same value.
/// - `push_off`/`pop_off` nest; only the outermost `pop_off` re-enables
///   migration.
pub trait CpuLocal: Sync {
    /// Logical id of the executing CPU, `0..ncpu`.
    fn cpu_id(&self) -> usize;

    /// Disable migration (and interrupts, in the kernel).
    fn push_off(&self);

    /// Undo one `push_off`.
    fn pop_off(&self);
}

/// RAII guard pinning the current operation to one CPU.
///
/// The CPU id is sampled once, after migration is disabled, and stays valid
/// until the guard is dropped.
pub struct CpuPin<'a, C: CpuLocal + ?Sized> {
    cpu: &'a C,
    id: usize,
}

impl<'a, C: CpuLocal + ?Sized> CpuPin<'a, C> {
    #[inline]
    #[must_use]
    pub fn new(cpu: &'a C) -> Self {
        cpu.push_off();
        let id = cpu.cpu_id();
        Self { cpu, id }
    }

    /// The pinned CPU.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }
}

impl<C: CpuLocal + ?Sized> Drop for CpuPin<'_, C> {
    fn drop(&mut self) {
        self.cpu.pop_off();
    }
}

/// A CPU identity that never changes, for contexts that cannot migrate
/// (early boot, single-CPU configurations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCpu(usize);

impl FixedCpu {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }
}

impl CpuLocal for FixedCpu {
    #[inline]
    fn cpu_id(&self) -> usize {
        self.0
    }

    #[inline]
    fn push_off(&self) {}

    #[inline]
    fn pop_off(&self) {}
}

#[cfg(feature = "std")]
mod hosted {
    use super::CpuLocal;
    use std::cell::Cell;

    std::thread_local! {
        static CPU_ID: Cell<usize> = const { Cell::new(0) };
        static NOFF: Cell<usize> = const { Cell::new(0) };
    }

    /// Maps host threads onto logical CPUs.
    ///
    /// A thread runs as CPU 0 until it calls [`ThreadCpu::bind`]. Threads never
    /// migrate between logical CPUs on their own, so pinning only tracks nesting.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ThreadCpu;

    impl ThreadCpu {
        /// Make the calling thread run as logical CPU `id` from now on.
        ///
        /// # Panics
        /// When called while the thread is pinned.
        pub fn bind(id: usize) {
            assert_eq!(NOFF.with(Cell::get), 0, "rebinding a pinned thread");
            CPU_ID.with(|c| c.set(id));
        }

        /// Current pin nesting depth of the calling thread.
        #[must_use]
        pub fn depth() -> usize {
            NOFF.with(Cell::get)
        }
    }

    impl CpuLocal for ThreadCpu {
        fn cpu_id(&self) -> usize {
            CPU_ID.with(Cell::get)
        }

        fn push_off(&self) {
            NOFF.with(|n| n.set(n.get() + 1));
        }

        fn pop_off(&self) {
            NOFF.with(|n| {
                let depth = n.get();
                assert!(depth > 0, "pop_off without push_off");
                n.set(depth - 1);
            });
        }
    }
}

#[cfg(feature = "std")]
pub use hosted::ThreadCpu;
