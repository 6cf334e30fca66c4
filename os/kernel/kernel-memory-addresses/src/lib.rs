//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw addresses and 4 KiB page bases used by the
//! frame allocator, the page-table layer and the process memory code.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | A byte address in a process's (page-table translated) address space. |
//! | [`VirtualPage`] | The page-aligned base of a 4 KiB virtual page. |
//! | [`PhysicalAddress`] | A byte address in physical memory. |
//! | [`PhysicalPage`] | The page-aligned base of a 4 KiB physical frame. |
//!
//! Only one page size exists in this kernel ([`PAGE_SIZE`]); there are no
//! huge pages, so the page types carry no size parameter.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0000_3123);
//! let page = va.page();
//! assert_eq!(page.base().as_u64(), 0x3000);
//! assert_eq!(va.page_offset(), 0x123);
//! assert_eq!(page.number(), 3);
//!
//! let pa = PhysicalAddress::new(0x0020_5000);
//! assert!(pa.is_page_aligned());
//! assert_eq!(pa.page().number(), 0x205);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` over `u64` and implement `Copy`,
//!   `Eq`, `Ord` and `Hash`, making them usable as map keys.
//! - Virtual and physical values never convert into each other implicitly;
//!   the page-table layer is the only place where one becomes the other.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`; the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the in-page offset bits.
pub const PAGE_MASK: u64 = PAGE_SIZE - 1;

const _: () = assert!(1 << PAGE_SHIFT == PAGE_SIZE);

/// Round `v` down to a multiple of [`PAGE_SIZE`].
#[inline]
#[must_use]
pub const fn page_round_down(v: u64) -> u64 {
    v & !PAGE_MASK
}

/// Round `v` up to a multiple of [`PAGE_SIZE`], or `None` on overflow.
#[inline]
#[must_use]
pub const fn page_round_up(v: u64) -> Option<u64> {
    match v.checked_add(PAGE_MASK) {
        Some(x) => Some(x & !PAGE_MASK),
        None => None,
    }
}

/// Number of pages needed to cover `bytes`.
#[inline]
#[must_use]
pub const fn pages_spanning(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}
