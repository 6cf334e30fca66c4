//! # Process Memory Management
//!
//! Per-process memory on top of the reference-counted frame allocator:
//! copy-on-write fork, demand-paged mappings, a family shared page, eager
//! heap growth, page-fault dispatch and the memory system calls.
//!
//! ## Architecture Overview
//!
//! ```text
//!   syscall ─────┐           page fault ─────┐
//!                ▼                           ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                 MemoryManager<'a, M>                 │
//! │  fork / cow fault │ map_demand / demand fault │ shm  │
//! │  grow / exit      │ read_user / write_user           │
//! └─────────┬──────────────────────────┬─────────────────┘
//!           │ &FrameAllocator<M>       │ &mut UserMemory
//! ┌─────────▼───────────────┐  ┌───────▼─────────────────┐
//! │ allocate/retain/release │  │ AddressSpace (PD + PTs) │
//! │ FreeList │ RefTable     │  │ size, reservations,     │
//! └─────────────────────────┘  │ shared slot             │
//!                              └─────────────────────────┘
//! ```
//!
//! One [`FrameAllocator`] is shared by reference. Each process owns its
//! [`UserMemory`]; operations on distinct processes may run in parallel.
//!
//! ## Reference accounting
//!
//! Every present leaf that is not a kernel structure holds exactly one
//! reference on its frame. Mapping retains or allocates, unmapping releases.
//! A frame is therefore free exactly when no address space maps it.
//!
//! ## Example
//!
//! ```rust
//! use kernel_alloc::FrameAllocator;
//! use kernel_info::memory::PoolLayout;
//! use kernel_memory_addresses::PAGE_SIZE;
//! use kernel_mm::MemoryManager;
//!
//! let frames = FrameAllocator::boot(PoolLayout::small(32)).unwrap();
//! let mm = MemoryManager::new(&frames);
//! let mut parent = mm.spawn(1).unwrap();
//! let base = mm.grow(&mut parent, 2 * PAGE_SIZE as i64).unwrap();
//! mm.write_user(&mut parent, base, b"hello").unwrap();
//!
//! let free = mm.free_frames();
//! let mut child = mm.fork(&mut parent).unwrap();
//! assert_eq!(mm.free_frames(), free);
//!
//! mm.write_user(&mut child, base, b"jello").unwrap();
//! assert_eq!(mm.free_frames(), free - 1);
//!
//! let mut buf = [0u8; 5];
//! mm.read_user(&mut parent, base, &mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod cow;
mod demand;
mod error;
mod fault;
mod lifecycle;
mod memory;
mod shared;
mod stats;
pub mod syscall;
mod user_access;

pub use error::MmError;
pub use fault::{Fault, FaultKind, FaultOutcome, FaultResolution, resolve};
pub use memory::{PageState, Pid, Reservations, SharedSlot, UserMemory};
pub use stats::CowStats;

use core::sync::atomic::{AtomicU32, Ordering};
use kernel_alloc::{ArenaPhysMapper, FrameAllocator, FrameIndex, PhysMapper};
use kernel_vmem::PageEntryBits;
use stats::CowCounters;

/// Entry point for all process memory operations.
pub struct MemoryManager<'a, M = ArenaPhysMapper> {
    frames: &'a FrameAllocator<M>,
    cow: CowCounters,
    next_pid: AtomicU32,
}

impl<'a, M: PhysMapper> MemoryManager<'a, M> {
    #[must_use]
    pub const fn new(frames: &'a FrameAllocator<M>) -> Self {
        Self {
            frames,
            cow: CowCounters::new(),
            next_pid: AtomicU32::new(1),
        }
    }

    #[must_use]
    pub const fn frames(&self) -> &'a FrameAllocator<M> {
        self.frames
    }

    fn next_pid(&self) -> Pid {
        Pid(self.next_pid.fetch_add(1, Ordering::Relaxed))
    }

    /// Copy-on-write counters since this manager was created.
    #[must_use]
    pub fn cow_stats(&self) -> CowStats {
        self.cow.snapshot()
    }

    /// Frames on the free list.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.frames.free_count()
    }

    /// Frames in use anywhere in the system.
    #[must_use]
    pub fn resident_physical_pages(&self) -> usize {
        self.frames.total_frames() - self.frames.free_count()
    }

    /// The allocator frame behind a present leaf.
    fn frame_of(&self, e: PageEntryBits) -> Result<FrameIndex, MmError> {
        Ok(self.frames.frame_of(e.physical_address())?)
    }
}
