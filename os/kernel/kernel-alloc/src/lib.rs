//! # Physical Frame Allocation
//!
//! Reference-counted allocation of 4 KiB physical frames. Every frame of the
//! managed range is either on the free list with a count of zero, or
//! allocated with a count equal to the number of live mappings that refer to
//! it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 FrameAllocator                      │
//! │    • allocate / retain / release                    │
//! │    • two-stage boot, then shared by reference       │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │                          │
//! ┌──────────▼────────────┐  ┌──────────▼────────────────┐
//! │  SpinLock<FreeList>   │  │  SpinLock<RefTable>       │
//! │  LIFO of free frames  │  │  FrameIndex → u32         │
//! └──────────┬────────────┘  └───────────────────────────┘
//!            │
//! ┌──────────▼──────────────────────────────────────────┐
//! │                  PhysMapper                         │
//! │    • scrub, zero, copy and access frame contents    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Classes
//!
//! * [`FrameAllocError`]: the pool is empty. The caller decides what to do,
//!   typically killing the process that needed the frame.
//! * [`InvariantViolation`]: a frame was released too often, an address
//!   outside the pool was handed back, or a count overflowed. These mean the
//!   kernel's bookkeeping is corrupt and must halt it.
//! * [`BootError`]: the pool was populated with an invalid range.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{FrameAllocator, Released};
//! use kernel_info::memory::PoolLayout;
//!
//! let alloc = FrameAllocator::boot(PoolLayout::small(8)).unwrap();
//! let frame = alloc.allocate().unwrap();
//! alloc.retain(frame).unwrap();
//! assert_eq!(alloc.release(frame), Ok(Released::StillShared(1)));
//! assert_eq!(alloc.release(frame), Ok(Released::Freed));
//! assert_eq!(alloc.free_count(), 8);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod error;
mod frame;
pub mod frame_alloc;
mod free_list;
pub mod phys_mapper;
mod ref_table;

pub use error::{BootError, FrameAllocError, InvariantViolation};
pub use frame::FrameIndex;
pub use frame_alloc::{BootStage, FrameAllocator, Released};
pub use phys_mapper::{ArenaPhysMapper, DirectMapPhysMapper, FRAME_BYTES, PhysMapper};
