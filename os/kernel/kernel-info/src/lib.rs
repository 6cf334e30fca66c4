//! # Kernel Memory Configuration
//!
//! Compile-time constants and small value types that fix the memory layout
//! shared by the frame allocator, the page-table layer and process memory
//! management. Every component reads its geometry from here so that the
//! user/kernel split, the shared page address and the physical pool bounds
//! cannot drift apart.
//!
//! ## Virtual Address Space Layout (per process)
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Declared size `sz`             │
//!             │  (sbrk heap, demand mappings)   │
//! USER_TOP    ├─────────────────────────────────┤ 0x7FFF_F000
//!             │  Family shared page             │ SHARED_PAGE_VA
//! KERNEL_BASE ├─────────────────────────────────┤ 0x8000_0000
//!             │  Kernel space                   │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Kernel image (never managed)   │
//! KERNEL_END  ├─────────────────────────────────┤ 2 MiB
//!             │  Boot stage 1 frames            │
//! EARLY_BOOT  ├─────────────────────────────────┤ 4 MiB
//!             │  Boot stage 2 frames            │
//! PHYS_TOP    └─────────────────────────────────┘ 224 MiB
//! ```
//!
//! Layout invariants are checked with `const` assertions in [`memory`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
