//! Memory system calls.
//!
//! Every call returns a single `u64`. Recoverable failures become the
//! sentinel of the call; only a broken allocator invariant escapes as `Err`
//! so the caller can halt.

use crate::memory::UserMemory;
use crate::{MemoryManager, MmError};
use kernel_alloc::{InvariantViolation, PhysMapper};
use log::trace;

/// Failure value of calls that return an address.
pub const NULL: u64 = 0;

/// Failure value of calls that return a size or status (`-1`).
pub const FAILED: u64 = u64::MAX;

#[repr(u64)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sysno {
    /// Grow (or shrink) the process by `arg0` bytes; returns the old size.
    Sbrk = 12,
    /// Virtual pages of the caller, including reserved and shared ones.
    NumVirtualPages = 22,
    /// Physical frames in use system-wide.
    NumPhysicalPages = 23,
    /// Page-table pages of the caller.
    PageTableSize = 24,
    /// Reserve `arg0` bytes for demand paging; returns the base.
    Mmap = 25,
    /// Create (or return) the family shared page.
    MapShared = 26,
    /// Address of the shared page if the caller holds the grant.
    GetShared = 27,
    /// Drop the caller's shared page.
    UnmapShared = 28,
    /// Frames on the free list.
    NumFreePages = 29,
}

/// Dispatch memory system call `sysno` with argument `arg0` for `mem`.
///
/// Unknown numbers return [`FAILED`].
///
/// # Errors
/// Allocator invariant violations, which must halt the kernel.
#[allow(clippy::cast_possible_wrap)]
pub fn syscall<M: PhysMapper>(
    mm: &MemoryManager<'_, M>,
    mem: &mut UserMemory,
    sysno: u64,
    arg0: u64,
) -> Result<u64, InvariantViolation> {
    let signed = arg0 as i64;
    let ret = match sysno {
        x if x == Sysno::Sbrk as u64 => or_sentinel(mm.grow(mem, signed).map(u64::from), FAILED)?,
        x if x == Sysno::NumVirtualPages as u64 => mem.virtual_pages() as u64,
        x if x == Sysno::NumPhysicalPages as u64 => mm.resident_physical_pages() as u64,
        x if x == Sysno::PageTableSize as u64 => mem.page_table_pages() as u64,
        x if x == Sysno::Mmap as u64 => {
            or_sentinel(mm.map_demand(mem, signed).map(u64::from), NULL)?
        }
        x if x == Sysno::MapShared as u64 => {
            or_sentinel(mm.create_shared(mem).map(u64::from), NULL)?
        }
        x if x == Sysno::GetShared as u64 => mem.lookup_shared().map_or(NULL, u64::from),
        x if x == Sysno::UnmapShared as u64 => {
            or_sentinel(mm.release_shared(mem).map(|_| 0), FAILED)?
        }
        x if x == Sysno::NumFreePages as u64 => mm.free_frames() as u64,
        _ => FAILED,
    };
    trace!("{}: syscall {sysno}({arg0:#x}) = {ret:#x}", mem.pid());
    Ok(ret)
}

fn or_sentinel(result: Result<u64, MmError>, sentinel: u64) -> Result<u64, InvariantViolation> {
    match result {
        Ok(v) => Ok(v),
        Err(MmError::Fatal(v)) => Err(v),
        Err(_) => Ok(sentinel),
    }
}
