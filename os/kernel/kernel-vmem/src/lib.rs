//! # Virtual Memory Support
//!
//! Software model of a classic two-level x86 page table, used as the
//! "install / remove / translate" capability of the memory manager.
//!
//! ## What you get
//! - An [`AddressSpace`] owning a page directory and its page tables.
//! - [`PageEntryBits`], a 32-bit leaf entry with the hardware permission bits
//!   and two OS-defined markers (copy-on-write, family shared page).
//! - Typed [`L2Index`]/[`L1Index`] helpers for the address split.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! ```text
//!  PD  →  PT  →  Physical Page
//!   │      │
//!   │      └───► PTE  (Page Table Entry)     → maps 4 KiB page
//!   └──────────► PDE  (Page Directory Entry) → points to a PT
//! ```
//!
//! Both levels hold 1024 entries, so one directory spans 4 GiB and one page
//! table spans 4 MiB. Only the lower half (below `KERNEL_BASE`) is user
//! space; this crate refuses to map anything above it.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod address_space;
mod error;
mod page_entry_bits;
pub mod page_table;

pub use crate::address_space::AddressSpace;
pub use crate::error::MapError;
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::{L1Index, L2Index, split_indices};

/// Re-export constants as info module.
pub use kernel_info::memory as info;
