//! # Kernel synchronization primitives
//!
//! A test-and-test-and-set [`RawSpin`] and the value-carrying [`SpinLock`]
//! built on it. The frame allocator keeps its free list and its reference
//! table behind two separate [`SpinLock`]s.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod raw_spin;
mod spin_lock;

pub use raw_spin::RawSpin;
pub use spin_lock::{SpinLock, SpinLockGuard};
