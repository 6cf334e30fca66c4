//! # Demand Paging
//!
//! [`map_demand`](MemoryManager::map_demand) only moves the size of the
//! process and records the new range as reserved. Frames appear one page at a
//! time, on the first fault inside the range.

use crate::memory::UserMemory;
use crate::{FaultOutcome, MemoryManager, MmError};
use kernel_alloc::PhysMapper;
use kernel_info::memory::USER_TOP;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_vmem::PageEntryBits;
use log::{debug, trace, warn};

impl<M: PhysMapper> MemoryManager<'_, M> {
    /// Reserve `len` bytes at the current end of the process.
    ///
    /// Returns the old size, which is the base of the new range.
    ///
    /// # Errors
    /// - [`MmError::InvalidLength`] unless `len` is positive and a multiple
    ///   of the page size.
    /// - [`MmError::NullBase`] if the process is empty, so the range would
    ///   start at address 0 and be indistinguishable from failure.
    /// - [`MmError::AddressSpaceExhausted`] if the range would reach the
    ///   shared page.
    pub fn map_demand(&self, mem: &mut UserMemory, len: i64) -> Result<VirtualAddress, MmError> {
        let bytes = u64::try_from(len)
            .ok()
            .filter(|&b| b > 0 && b.is_multiple_of(PAGE_SIZE))
            .ok_or(MmError::InvalidLength(len))?;

        let base = mem.size;
        if base == 0 {
            return Err(MmError::NullBase);
        }
        let end = base
            .checked_add(bytes)
            .filter(|&end| end <= USER_TOP)
            .ok_or(MmError::AddressSpaceExhausted)?;

        mem.reserved.insert(base..end);
        mem.size = end;
        debug!("{}: reserved {base:#x}..{end:#x}", mem.pid);
        Ok(VirtualAddress::new(base))
    }

    /// Back one reserved page with a zeroed frame.
    pub(crate) fn demand_fault(
        &self,
        mem: &mut UserMemory,
        va: VirtualAddress,
    ) -> Result<FaultOutcome, MmError> {
        let frame = self.frames.allocate().inspect_err(|_| {
            warn!("{}: no frame for demand page {}", mem.pid, va.page());
        })?;
        self.frames.zero_frame(frame);
        if let Err(e) = mem.space.map(va, frame.page(), PageEntryBits::user_rw()) {
            self.frames.release(frame)?;
            return Err(e.into());
        }
        trace!("{}: demand page {} -> {frame}", mem.pid, va.page());
        Ok(FaultOutcome::DemandZero)
    }
}
