//! # Kernel synchronization primitives
//!
//! | Primitive | Waits by | Used for |
//! |-----------|----------|----------|
//! | [`SpinLock`] | spinning (TATAS) | short critical sections: free-list shards, hash buckets |
//! | [`TicketLock`] | spinning, FIFO | single global locks that many CPUs queue on |
//! | [`SleepLock`] | yielding the CPU | long holds across I/O: buffer contents |
//!
//! [`CpuPin`] keeps an operation on the CPU it started on, which is what makes
//! per-CPU data structures sound without a global lock.
//!
//! With the `std` feature the crate links against the standard library and
//! provides [`ThreadCpu`], which maps host threads onto logical CPUs.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

mod cpu;
mod sleep_lock;
mod spin_lock;
mod ticket_lock;

pub use cpu::{CpuLocal, CpuPin, FixedCpu};
#[cfg(feature = "std")]
pub use cpu::ThreadCpu;
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use ticket_lock::{TicketLock, TicketLockGuard};
